//! Stored-procedure marshalling shared by the adapters.
//!
//! Callers describe outputs as an ordered list of [`OutParam::Type`] slots.
//! Cursor slots yield result sets; every other slot yields one scalar.
//! Backends disagree on how those scalars come back, so a
//! [`ProcedureCall`] offers the two argument layouts drivers understand and
//! assembles the replies into fresh slots. Nothing is written into the
//! caller's list until the whole call has succeeded.

use sqlbridge_core::error::ProcedureError;
use sqlbridge_core::{DriverConnection, Error, OutParam, OutType, ProcArg, Result, Rows, Value};

/// One prepared stored-procedure invocation.
#[derive(Debug, Clone)]
pub struct ProcedureCall<'a> {
    name: &'a str,
    inputs: &'a [Value],
    outputs: Vec<OutType>,
}

impl<'a> ProcedureCall<'a> {
    /// Validate that every output slot is still a type declaration.
    pub fn new(name: &'a str, inputs: &'a [Value], outputs: &[OutParam]) -> Result<Self> {
        let outputs = outputs
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.declared().ok_or_else(|| {
                    Error::from(ProcedureError::new(
                        name,
                        format!("output slot {i} is not a type declaration"),
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name,
            inputs,
            outputs,
        })
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn inputs(&self) -> &[Value] {
        self.inputs
    }

    pub fn outputs(&self) -> &[OutType] {
        &self.outputs
    }

    pub fn has_cursor(&self) -> bool {
        self.outputs.iter().any(|t| t.is_cursor())
    }

    /// Number of scalar (non-cursor) outputs.
    pub fn scalar_count(&self) -> usize {
        self.outputs.iter().filter(|t| !t.is_cursor()).count()
    }

    /// Inputs followed by a typed default value per scalar output. Used with
    /// drivers that only pass plain values and report outputs some other way.
    pub fn placeholder_args(&self) -> Vec<ProcArg> {
        self.inputs
            .iter()
            .cloned()
            .map(ProcArg::In)
            .chain(
                self.outputs
                    .iter()
                    .filter(|t| !t.is_cursor())
                    .map(|t| ProcArg::In(t.placeholder())),
            )
            .collect()
    }

    /// Inputs followed by typed output binds. `bind_cursors` controls
    /// whether cursor slots get a bind of their own.
    pub fn typed_args(&self, bind_cursors: bool) -> Vec<ProcArg> {
        self.inputs
            .iter()
            .cloned()
            .map(ProcArg::In)
            .chain(
                self.outputs
                    .iter()
                    .filter(|t| bind_cursors || !t.is_cursor())
                    .map(|t| ProcArg::Out(*t)),
            )
            .collect()
    }

    /// Argument position of output `index`, counting cursor slots only
    /// when they are bound.
    pub fn arg_position(&self, index: usize, cursors_bound: bool) -> usize {
        let skipped = if cursors_bound {
            0
        } else {
            self.outputs[..index].iter().filter(|t| t.is_cursor()).count()
        };
        self.inputs.len() + index - skipped
    }

    /// Build the filled-in slots.
    ///
    /// `scalar(i)` produces the value for scalar output `i`; `cursor(k)`
    /// the rows for the `k`-th cursor slot.
    pub fn assemble<S, C>(&self, mut scalar: S, mut cursor: C) -> Result<Vec<OutParam>>
    where
        S: FnMut(usize) -> Result<Value>,
        C: FnMut(usize) -> Result<Rows>,
    {
        let mut cursors = 0;
        self.outputs
            .iter()
            .enumerate()
            .map(|(i, t)| {
                if t.is_cursor() {
                    let rows = cursor(cursors)?;
                    cursors += 1;
                    Ok(OutParam::Rows(rows))
                } else {
                    scalar(i).map(OutParam::Scalar)
                }
            })
            .collect()
    }

    /// Value at `position` of a driver's returned parameter list.
    pub fn returned(&self, params: &[Value], position: usize) -> Result<Value> {
        params.get(position).cloned().ok_or_else(|| {
            ProcedureError::new(
                self.name,
                format!(
                    "driver returned {} parameters, output expected at position {position}",
                    params.len()
                ),
            )
            .into()
        })
    }

    /// Wrap a failure as a procedure error, keeping procedure errors as is.
    pub fn fail(&self, err: Error) -> Error {
        match err {
            Error::Procedure(_) => err,
            other => ProcedureError::caused_by(self.name, other).into(),
        }
    }
}

/// Rows of the `k`-th result set, or an empty set when the driver opened
/// fewer.
pub fn result_set(sets: &[Rows], k: usize) -> Rows {
    sets.get(k).cloned().unwrap_or_default()
}

/// Typed output binds for scalars only; cursors come back as the
/// procedure's result sets, in declaration order.
pub fn call_with_typed_outputs(
    conn: &mut dyn DriverConnection,
    call: &ProcedureCall<'_>,
) -> Result<Vec<OutParam>> {
    let reply = conn
        .call_procedure(call.name(), &call.typed_args(false))
        .map_err(|e| call.fail(e))?;
    call.assemble(
        |i| call.returned(&reply.params, call.arg_position(i, false)),
        |k| Ok(result_set(&reply.result_sets, k)),
    )
    .map_err(|e| call.fail(e))
}

/// Typed output binds for every output, cursor variables included.
pub fn call_with_cursor_binds(
    conn: &mut dyn DriverConnection,
    call: &ProcedureCall<'_>,
) -> Result<Vec<OutParam>> {
    let reply = conn
        .call_procedure(call.name(), &call.typed_args(true))
        .map_err(|e| call.fail(e))?;
    call.assemble(
        |i| call.returned(&reply.params, call.arg_position(i, true)),
        |k| Ok(result_set(&reply.result_sets, k)),
    )
    .map_err(|e| call.fail(e))
}

/// Plain placeholder values for scalars, read back from the returned
/// parameter list; cursors come back as result sets.
pub fn call_with_placeholders(
    conn: &mut dyn DriverConnection,
    call: &ProcedureCall<'_>,
) -> Result<Vec<OutParam>> {
    let reply = conn
        .call_procedure(call.name(), &call.placeholder_args())
        .map_err(|e| call.fail(e))?;
    call.assemble(
        |i| call.returned(&reply.params, call.arg_position(i, false)),
        |k| Ok(result_set(&reply.result_sets, k)),
    )
    .map_err(|e| call.fail(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(types: &[OutType]) -> Vec<OutParam> {
        types.iter().copied().map(OutParam::from).collect()
    }

    #[test]
    fn rejects_filled_slots() {
        let outputs = vec![OutParam::Scalar(Value::Int(1))];
        let err = ProcedureCall::new("p", &[], &outputs).unwrap_err();
        assert!(matches!(err, Error::Procedure(_)));
    }

    #[test]
    fn placeholder_args_skip_cursor() {
        let inputs = [Value::Int(7)];
        let outputs = slots(&[OutType::Int, OutType::Cursor, OutType::String]);
        let call = ProcedureCall::new("p", &inputs, &outputs).unwrap();
        assert!(call.has_cursor());
        assert_eq!(call.scalar_count(), 2);
        assert_eq!(
            call.placeholder_args(),
            vec![
                ProcArg::In(Value::Int(7)),
                ProcArg::In(Value::BigInt(0)),
                ProcArg::In(Value::Text(String::new())),
            ]
        );
    }

    #[test]
    fn typed_args_with_and_without_cursor_binds() {
        let outputs = slots(&[OutType::Cursor, OutType::Float]);
        let call = ProcedureCall::new("p", &[], &outputs).unwrap();
        assert_eq!(call.typed_args(false), vec![ProcArg::Out(OutType::Float)]);
        assert_eq!(
            call.typed_args(true),
            vec![ProcArg::Out(OutType::Cursor), ProcArg::Out(OutType::Float)]
        );
    }

    #[test]
    fn positions_account_for_skipped_cursors() {
        let inputs = [Value::Int(1), Value::Int(2)];
        let outputs = slots(&[OutType::Int, OutType::Cursor, OutType::Int]);
        let call = ProcedureCall::new("p", &inputs, &outputs).unwrap();
        assert_eq!(call.arg_position(0, false), 2);
        assert_eq!(call.arg_position(2, false), 3);
        assert_eq!(call.arg_position(2, true), 4);
    }

    #[test]
    fn assemble_fills_slots_in_order() {
        let outputs = slots(&[OutType::Int, OutType::Cursor]);
        let call = ProcedureCall::new("p", &[], &outputs).unwrap();
        let rows = Rows::from_values(vec!["a".into()], vec![vec![Value::Int(1)]]);
        let filled = call
            .assemble(|_| Ok(Value::Int(9)), |k| Ok(result_set(std::slice::from_ref(&rows), k)))
            .unwrap();
        assert_eq!(filled[0], OutParam::Scalar(Value::Int(9)));
        assert_eq!(filled[1], OutParam::Rows(rows));
    }

    #[test]
    fn missing_returned_parameter_is_a_procedure_error() {
        let call = ProcedureCall::new("p", &[], &[]).unwrap();
        assert!(matches!(call.returned(&[], 0), Err(Error::Procedure(_))));
    }
}
