//! A scripted in-memory driver.
//!
//! [`ScriptedDriver`] records every call its connections receive and
//! answers from a queue of canned replies, so adapter conventions can be
//! exercised without a server. Clones share the same script and log.
//!
//! ```ignore
//! let driver = ScriptedDriver::new("pg-script", ParamStyle::Format);
//! driver.push_rows(&["id"], vec![vec![Value::Int(7)]]);
//! environment.dialects().register_driver(DialectKind::Postgres, Arc::new(driver.clone()));
//! ```

use sqlbridge_core::error::{ExecutionErrorKind, ProcedureError};
use sqlbridge_core::{
    Driver, DriverConnection, Error, Execution, Keywords, ParamStyle, ProcArg, ProcReply, Result,
    Rows, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    Execute { sql: String, params: Vec<Value> },
    Begin,
    Commit,
    Rollback,
    Procedure { name: String, args: Vec<ProcArg> },
    Ping(String),
    Close,
}

impl Event {
    /// An `Execute` event without parameters.
    pub fn execute(sql: &str) -> Self {
        Event::Execute {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Script {
    events: Vec<Event>,
    replies: VecDeque<Execution>,
    procedures: VecDeque<ProcReply>,
    failures: Vec<String>,
    connects: usize,
    closes: usize,
}

/// Driver whose connections follow a script.
#[derive(Clone)]
pub struct ScriptedDriver {
    name: String,
    style: ParamStyle,
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    pub fn new(name: impl Into<String>, style: ParamStyle) -> Self {
        Self {
            name: name.into(),
            style,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a result set for the next statement.
    pub fn push_rows(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns = columns.iter().map(|c| (*c).to_string()).collect();
        self.script()
            .replies
            .push_back(Execution::rows(Rows::from_values(columns, rows)));
    }

    /// Queue an affected-row count for the next statement.
    pub fn push_affected(&self, count: u64) {
        self.script().replies.push_back(Execution::affected(count));
    }

    /// Queue the reply to the next procedure call.
    pub fn push_reply(&self, reply: ProcReply) {
        self.script().procedures.push_back(reply);
    }

    /// Fail every statement or procedure whose text contains `needle`.
    pub fn fail_when(&self, needle: &str) {
        self.script().failures.push(needle.to_string());
    }

    pub fn events(&self) -> Vec<Event> {
        self.script().events.clone()
    }

    /// Executed statements, in order.
    pub fn statements(&self) -> Vec<String> {
        self.script()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Execute { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.script().connects
    }

    pub fn closes(&self) -> usize {
        self.script().closes
    }

    pub fn clear_events(&self) {
        self.script().events.clear();
    }
}

impl std::fmt::Debug for ScriptedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedDriver")
            .field("name", &self.name)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

impl Driver for ScriptedDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_style(&self) -> ParamStyle {
        self.style
    }

    fn connect(&self, _keywords: &Keywords) -> Result<Box<dyn DriverConnection>> {
        let mut script = self.script();
        script.connects += 1;
        script.events.push(Event::Connect);
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnection {
    fn record(&self, event: Event) -> MutexGuard<'_, Script> {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.events.push(event);
        script
    }
}

impl DriverConnection for ScriptedConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Execution> {
        let mut script = self.record(Event::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if script.failures.iter().any(|f| sql.contains(f.as_str())) {
            return Err(Error::execution(
                ExecutionErrorKind::Database,
                format!("scripted failure: {sql}"),
            ));
        }
        if let Some(reply) = script.replies.pop_front() {
            return Ok(reply);
        }
        let is_query = sql.trim_start().to_ascii_uppercase().starts_with("SELECT");
        Ok(if is_query {
            Execution::rows(Rows::empty())
        } else {
            Execution::affected(1)
        })
    }

    fn begin(&mut self) -> Result<()> {
        drop(self.record(Event::Begin));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        drop(self.record(Event::Commit));
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        drop(self.record(Event::Rollback));
        Ok(())
    }

    fn call_procedure(&mut self, name: &str, args: &[ProcArg]) -> Result<ProcReply> {
        let mut script = self.record(Event::Procedure {
            name: name.to_string(),
            args: args.to_vec(),
        });
        if script.failures.iter().any(|f| name.contains(f.as_str())) {
            return Err(ProcedureError::new(name, "scripted failure").into());
        }
        Ok(script.procedures.pop_front().unwrap_or_default())
    }

    fn ping(&mut self, query: &str) -> Result<()> {
        let script = self.record(Event::Ping(query.to_string()));
        if script.failures.iter().any(|f| query.contains(f.as_str())) {
            return Err(Error::execution(
                ExecutionErrorKind::Database,
                format!("scripted failure: {query}"),
            ));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut script = self.record(Event::Close);
        script.closes += 1;
        Ok(())
    }
}
