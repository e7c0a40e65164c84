//! Selection predicates decide whether an object is visible to a list or a
//! watch subscription. The same predicate is evaluated by storage `list`
//! calls and by every watch node.

mod selector;

pub use selector::*;


#[cfg(test)]
use mockall::automock;

use crate::ListOptions;
use crate::Object;
use crate::Result;

/// Label/field filter evaluated against an object.
///
/// Implementations must be pure: evaluating the same object twice yields the
/// same answer and has no side effects.
#[cfg_attr(test, automock)]
pub trait Predicate: Send + Sync + 'static {
    fn matches(
        &self,
        obj: &Object,
    ) -> Result<bool>;
}

/// Predicate built from a label selector and a field selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPredicate {
    pub label: LabelSelector,
    pub field: FieldSelector,
}

impl SelectionPredicate {
    /// Matches every object.
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn parse(
        label_selector: &str,
        field_selector: &str,
    ) -> Result<Self> {
        Ok(Self {
            label: LabelSelector::parse(label_selector)?,
            field: FieldSelector::parse(field_selector)?,
        })
    }

    pub fn from_list_options(options: &ListOptions) -> Result<Self> {
        Self::parse(&options.label_selector, &options.field_selector)
    }

    pub fn is_everything(&self) -> bool {
        self.label.is_empty() && self.field.is_empty()
    }
}

impl Predicate for SelectionPredicate {
    fn matches(
        &self,
        obj: &Object,
    ) -> Result<bool> {
        if self.is_everything() {
            return Ok(true);
        }
        Ok(self.label.matches(&obj.meta.labels) && self.field.matches(obj))
    }
}
