//! Transaction handles.

use crate::context::Context;
use sqlbridge_core::Result;
use std::sync::Arc;

/// One level of a context's transaction stack.
///
/// The outermost level wraps the connection's own transaction; nested
/// levels are savepoints, or no-ops when nesting is ignored. Dropping an
/// unfinished transaction rolls it back.
///
/// Finishing a level also discards every level opened above it; finishing
/// one of those afterwards fails with
/// [`TransactionErrorKind::AlreadyFinished`](sqlbridge_core::error::TransactionErrorKind).
#[must_use = "dropping a transaction rolls it back"]
#[derive(Debug)]
pub struct Transaction {
    ctx: Arc<Context>,
    depth: usize,
    frame: u64,
    finished: bool,
}

impl Transaction {
    pub(crate) fn begin(ctx: Arc<Context>) -> Result<Self> {
        let (depth, frame) = ctx.begin()?;
        Ok(Self {
            ctx,
            depth,
            frame,
            finished: false,
        })
    }

    /// Nesting depth; 0 for the outermost level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Id of the context this transaction belongs to.
    pub fn context_id(&self) -> u64 {
        self.ctx.id()
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.ctx.end(self.depth, self.frame, true)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.ctx.end(self.depth, self.frame, false)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.ctx.end(self.depth, self.frame, false) {
            tracing::warn!(
                context = self.ctx.id(),
                depth = self.depth,
                error = %e,
                "Rollback of dropped transaction failed"
            );
        }
    }
}
