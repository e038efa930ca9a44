//! Driver traits.
//!
//! This module defines the boundary between SQLBridge and a concrete
//! database driver:
//!
//! - [`Driver`] - connects with dialect-specific keywords and reports the
//!   marker style it expects
//! - [`DriverConnection`] - one live, blocking connection
//! - [`OutType`] / [`OutParam`] - stored-procedure output specifications
//!
//! All operations are synchronous. A connection is not expected to be safe
//! for concurrent statements; callers hold it behind a lock.

use crate::config::Keywords;
use crate::error::{ProcedureError, Result};
use crate::row::Rows;
use crate::sql::ParamStyle;
use crate::value::Value;

/// The outcome of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    /// Present when the statement produced a result description, even with
    /// zero rows.
    pub result_set: Option<Rows>,
    /// Rows changed by a mutating statement.
    pub rows_affected: u64,
}

impl Execution {
    pub fn rows(rows: Rows) -> Self {
        Self {
            result_set: Some(rows),
            rows_affected: 0,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            result_set: None,
            rows_affected,
        }
    }
}

/// Declared type of a stored-procedure output position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OutType {
    Int = 1,
    Float = 2,
    String = 3,
    Date = 4,
    DateTime = 5,
    Binary = 6,
    Bit = 7,
    Image = 8,
    Decimal = 9,
    /// This position yields a result set rather than a scalar.
    Cursor = 20,
}

impl OutType {
    /// Look up a type by its legacy numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => OutType::Int,
            2 => OutType::Float,
            3 => OutType::String,
            4 => OutType::Date,
            5 => OutType::DateTime,
            6 => OutType::Binary,
            7 => OutType::Bit,
            8 => OutType::Image,
            9 => OutType::Decimal,
            20 => OutType::Cursor,
            _ => return None,
        })
    }

    pub fn is_cursor(self) -> bool {
        self == OutType::Cursor
    }

    /// Placeholder input for drivers that bind outputs as plain inputs.
    pub fn placeholder(self) -> Value {
        match self {
            OutType::Int | OutType::Bit => Value::BigInt(0),
            OutType::Float | OutType::Decimal => Value::Double(0.0),
            _ => Value::Text(String::new()),
        }
    }
}

/// A caller's output slot: a declared type before the call, the fetched
/// result after it.
#[derive(Debug, Clone, PartialEq)]
pub enum OutParam {
    Type(OutType),
    Scalar(Value),
    Rows(Rows),
}

impl OutParam {
    pub fn declared(&self) -> Option<OutType> {
        match self {
            OutParam::Type(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            OutParam::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&Rows> {
        match self {
            OutParam::Rows(r) => Some(r),
            _ => None,
        }
    }
}

impl From<OutType> for OutParam {
    fn from(t: OutType) -> Self {
        OutParam::Type(t)
    }
}

/// One argument of a native procedure call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcArg {
    In(Value),
    /// A typed output bind; `Cursor` asks for a cursor variable.
    Out(OutType),
}

/// What a native procedure call hands back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcReply {
    /// Final value of every argument position, in call order.
    pub params: Vec<Value>,
    /// Result sets in the order the procedure opened them; for cursor
    /// output variables, in argument order.
    pub result_sets: Vec<Rows>,
}

/// A database driver: a connection factory plus its marker style.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn param_style(&self) -> ParamStyle;

    fn connect(&self, keywords: &Keywords) -> Result<Box<dyn DriverConnection>>;
}

/// A live, blocking database connection.
pub trait DriverConnection: Send {
    /// Execute one statement with positional parameters.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Execution>;

    /// Start an explicit transaction. Drivers with implicit transactions
    /// can keep the default.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("SAVEPOINT {name}"), &[]).map(|_| ())
    }

    fn release(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("RELEASE SAVEPOINT {name}"), &[])
            .map(|_| ())
    }

    fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {name}"), &[])
            .map(|_| ())
    }

    /// Invoke a stored procedure natively.
    fn call_procedure(&mut self, name: &str, _args: &[ProcArg]) -> Result<ProcReply> {
        Err(ProcedureError::new(name, "driver does not support stored procedures").into())
    }

    /// Check the connection is alive by running `query`, the backend's
    /// cheapest statement. Drivers with a native ping may ignore it.
    fn ping(&mut self, query: &str) -> Result<()> {
        self.execute(query, &[]).map(|_| ())
    }

    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_type_codes_round_trip() {
        for code in [1, 2, 3, 4, 5, 6, 7, 8, 9, 20] {
            let t = OutType::from_code(code).unwrap();
            assert_eq!(t as u8, code);
        }
        assert_eq!(OutType::from_code(10), None);
        assert!(OutType::Cursor.is_cursor());
    }

    #[test]
    fn placeholders_match_declared_types() {
        assert_eq!(OutType::Int.placeholder(), Value::BigInt(0));
        assert_eq!(OutType::Float.placeholder(), Value::Double(0.0));
        assert_eq!(OutType::Date.placeholder(), Value::Text(String::new()));
    }

    #[test]
    fn out_param_accessors() {
        let slot = OutParam::from(OutType::String);
        assert_eq!(slot.declared(), Some(OutType::String));
        assert!(OutParam::Scalar(Value::Int(1)).as_scalar().is_some());
        assert!(OutParam::Rows(Rows::empty()).as_rows().is_some());
    }
}
