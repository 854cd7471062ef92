//! Traversal stack
//!
//! The visitor threads one [`Stack`] through every hook call. Hooks push an
//! operation or a context on `enter` and pop it on the matching `leave`, so
//! the stack always mirrors the part of the request currently being walked.
//!
//! Besides frames, the stack keeps a breadcrumb of the visited node names
//! (`mutation.updatePost.data.title`). It is only used to make build errors
//! point at the offending place in the request.

use crate::core::error::{GraphexError, Result};
use crate::execution::contexts::{
    DataContext, FieldsSelectionContext, ListValueContext, ObjectFieldContext, SelectorContext,
};
use crate::execution::operation::OperationId;

/// One entry of the traversal stack
#[derive(Debug, Clone)]
pub enum Frame {
    /// An operation owned by the transaction
    Operation(OperationId),
    Selector(SelectorContext),
    Data(DataContext),
    FieldsSelection(FieldsSelectionContext),
    ObjectField(ObjectFieldContext),
    ListValue(ListValueContext),
}

impl Frame {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Frame::Operation(_) => "Operation",
            Frame::Selector(_) => "Selector",
            Frame::Data(_) => "Data",
            Frame::FieldsSelection(_) => "FieldsSelection",
            Frame::ObjectField(_) => "ObjectField",
            Frame::ListValue(_) => "ListValue",
        }
    }
}

impl From<OperationId> for Frame {
    fn from(id: OperationId) -> Self {
        Frame::Operation(id)
    }
}

impl From<SelectorContext> for Frame {
    fn from(context: SelectorContext) -> Self {
        Frame::Selector(context)
    }
}

impl From<DataContext> for Frame {
    fn from(context: DataContext) -> Self {
        Frame::Data(context)
    }
}

impl From<FieldsSelectionContext> for Frame {
    fn from(context: FieldsSelectionContext) -> Self {
        Frame::FieldsSelection(context)
    }
}

impl From<ObjectFieldContext> for Frame {
    fn from(context: ObjectFieldContext) -> Self {
        Frame::ObjectField(context)
    }
}

impl From<ListValueContext> for Frame {
    fn from(context: ListValueContext) -> Self {
        Frame::ListValue(context)
    }
}

/// Generates a typed `pop_*` helper that fails with a build error when the
/// top frame has another kind.
macro_rules! typed_pop {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty> {
            match self.frames.pop() {
                Some(Frame::$variant(inner)) => Ok(inner),
                Some(other) => {
                    let found = other.kind_name();
                    self.frames.push(other);
                    Err(self.error(format!(
                        "expected {} frame on top of the stack, found {}",
                        stringify!($variant),
                        found
                    )))
                }
                None => Err(self.error(format!(
                    "expected {} frame on top of the stack, stack is empty",
                    stringify!($variant)
                ))),
            }
        }
    };
}

#[derive(Debug, Default)]
pub struct Stack {
    frames: Vec<Frame>,
    breadcrumbs: Vec<String>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: impl Into<Frame>) {
        self.frames.push(frame.into());
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    typed_pop!(pop_operation, Operation, OperationId);
    typed_pop!(pop_selector, Selector, SelectorContext);
    typed_pop!(pop_data, Data, DataContext);
    typed_pop!(pop_fields_selection, FieldsSelection, FieldsSelectionContext);
    typed_pop!(pop_object_field, ObjectField, ObjectFieldContext);
    typed_pop!(pop_list_value, ListValue, ListValueContext);

    /// Topmost operation frame, if any
    pub fn find_nearest_operation(&self) -> Option<OperationId> {
        self.frames.iter().rev().find_map(|frame| match frame {
            Frame::Operation(id) => Some(*id),
            _ => None,
        })
    }

    /// Like [`find_nearest_operation`](Self::find_nearest_operation) but a
    /// missing operation is a build error
    pub fn nearest_operation(&self) -> Result<OperationId> {
        self.find_nearest_operation()
            .ok_or_else(|| self.error("no operation on the stack"))
    }

    /// Dotted store path of the object fields pushed after `operation`
    ///
    /// Anonymous object-field frames do not contribute a segment.
    pub fn path_since(&self, operation: OperationId) -> Result<String> {
        let position = self
            .frames
            .iter()
            .rposition(|frame| matches!(frame, Frame::Operation(id) if *id == operation))
            .ok_or_else(|| self.error(format!("operation {} is not on the stack", operation)))?;

        let segments: Vec<&str> = self.frames[position + 1..]
            .iter()
            .filter_map(|frame| match frame {
                Frame::ObjectField(context) => context.field_name(),
                _ => None,
            })
            .collect();
        Ok(segments.join("."))
    }

    // === Breadcrumbs ===

    pub fn enter_path(&mut self, segment: impl Into<String>) {
        self.breadcrumbs.push(segment.into());
    }

    pub fn leave_path(&mut self) {
        self.breadcrumbs.pop();
    }

    /// Dotted names of the request nodes currently being walked
    pub fn breadcrumb(&self) -> String {
        self.breadcrumbs.join(".")
    }

    /// Build error pointing at the current breadcrumb
    pub fn error(&self, message: impl Into<String>) -> GraphexError {
        GraphexError::build(self.breadcrumb(), message)
    }
}
