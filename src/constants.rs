// -
// Watch queue sizing

/// Inbound and outbound queue capacity per watch node. Must stay above 1 so a
/// slow subscriber does not stall every broadcast, and so single-task callers
/// (tests seeding events while watching) do not deadlock.
pub(crate) const UPDATE_CHANNEL_SIZE: usize = 10;

/// Initial capacity of a watch set's node registry.
pub(crate) const INITIAL_WATCH_NODES_SIZE: usize = 20;

/// Initial capacity of a node's pre-start buffer.
pub(crate) const INITIAL_BUFFERED_EVENTS_SIZE: usize = 25;

// -
// Metric label values

pub(crate) const METHOD_CREATE: &str = "create";
pub(crate) const METHOD_GET: &str = "get";
pub(crate) const METHOD_LIST: &str = "list";
pub(crate) const METHOD_UPDATE: &str = "update";
pub(crate) const METHOD_DELETE: &str = "delete";

/// Prefix of every exported prometheus metric
pub(crate) const METRICS_NAMESPACE: &str = "dualstore";

/// Environment variable prefix for configuration overrides
pub(crate) const CONFIG_ENV_PREFIX: &str = "DUALSTORE";
