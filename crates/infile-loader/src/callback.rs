//! Hooks around each record's primary-row write.

use infile_core::{RecordRef, Result};

/// Callback invoked around the primary-row write of every persisted record.
///
/// An `Err` from either hook aborts the `persist` call it occurred in.
pub trait EventCallback {
    /// Called after the record's child dependencies are written, just
    /// before its own row is buffered.
    #[allow(unused_variables)]
    fn on_before_save(&mut self, record: &RecordRef) -> Result<()> {
        Ok(())
    }

    /// Called right after the record's row is buffered (its id is set).
    #[allow(unused_variables)]
    fn on_after_save(&mut self, record: &RecordRef) -> Result<()> {
        Ok(())
    }
}

/// Callback that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCallback;

impl EventCallback for NoOpCallback {}

/// Callback built from two closures.
pub struct FnCallback<B, A> {
    before: B,
    after: A,
}

impl<B, A> FnCallback<B, A>
where
    B: FnMut(&RecordRef) -> Result<()>,
    A: FnMut(&RecordRef) -> Result<()>,
{
    pub fn new(before: B, after: A) -> Self {
        Self { before, after }
    }
}

impl<B, A> EventCallback for FnCallback<B, A>
where
    B: FnMut(&RecordRef) -> Result<()>,
    A: FnMut(&RecordRef) -> Result<()>,
{
    fn on_before_save(&mut self, record: &RecordRef) -> Result<()> {
        (self.before)(record)
    }

    fn on_after_save(&mut self, record: &RecordRef) -> Result<()> {
        (self.after)(record)
    }
}

impl<B, A> std::fmt::Debug for FnCallback<B, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCallback").finish_non_exhaustive()
    }
}
