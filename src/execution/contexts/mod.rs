//! Context accumulators
//!
//! Short-lived values collected while the visitor descends into one argument
//! or input field. A context is pushed on the stack by a hook on `enter` and
//! consumed by the parent frame on `leave`. Contexts do no I/O and no
//! validation; hooks decide what is acceptable.

mod data;
mod fields_selection;
mod list_value;
mod object_field;
mod selector;

pub use data::{DataContext, SET_OPERATOR};
pub use fields_selection::FieldsSelectionContext;
pub use list_value::ListValueContext;
pub use object_field::ObjectFieldContext;
pub use selector::{Combinator, SelectorContext};
