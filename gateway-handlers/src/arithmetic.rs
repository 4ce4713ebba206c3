//! `ARITHMETIC`: applies one binary operation to `operandA`/`operandB`
//! (spec §8 scenario S3).

use async_trait::async_trait;
use gateway_core::{GatewayError, Handler, Request, Response, Result};
use serde_json::{Map, Value};

/// The four operations `ARITHMETIC` understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operation {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "ADD" => Ok(Self::Add),
            "SUB" => Ok(Self::Sub),
            "MUL" => Ok(Self::Mul),
            "DIV" => Ok(Self::Div),
            other => Err(GatewayError::HandlerFailed(format!("unknown ARITHMETIC operation '{other}'"))),
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64> {
        match self {
            Self::Add => Ok(a + b),
            Self::Sub => Ok(a - b),
            Self::Mul => Ok(a * b),
            Self::Div => {
                if b == 0.0 {
                    Err(GatewayError::HandlerFailed("division by zero".to_string()))
                } else {
                    Ok(a / b)
                }
            }
        }
    }
}

/// Computes `operation(operandA, operandB)` and returns it under `result`.
/// Used by the chain engine's built-in test scenarios to exercise
/// sequential composition, `when` guards, and parallel joins.
#[derive(Debug, Default)]
pub struct ArithmeticHandler;

fn operand(payload: &Map<String, Value>, key: &str) -> Result<f64> {
    payload
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| GatewayError::HandlerFailed(format!("missing numeric operand '{key}'")))
}

#[async_trait]
impl Handler for ArithmeticHandler {
    async fn construct(&mut self, _config: Map<String, Value>) -> Result<()> {
        Ok(())
    }

    async fn execute(&mut self, request: &Request) -> Result<Response> {
        let operation_raw = request
            .payload
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::HandlerFailed("missing 'operation'".to_string()))?;
        let operation = Operation::parse(operation_raw)?;
        let a = operand(&request.payload, "operandA")?;
        let b = operand(&request.payload, "operandB")?;
        let result = operation.apply(a, b)?;

        Ok(Response::success(request.request_id, "ARITHMETIC", serde_json::json!({ "result": result }), 0))
    }

    async fn stop(&mut self) {}
    async fn cleanup(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn request_with(operation: &str, a: f64, b: f64) -> Request {
        let mut payload = Map::new();
        payload.insert("operation".to_string(), Value::String(operation.to_string()));
        payload.insert("operandA".to_string(), serde_json::json!(a));
        payload.insert("operandB".to_string(), serde_json::json!(b));
        Request {
            request_id: Uuid::new_v4(),
            request_type: "ARITHMETIC".to_string(),
            api_key: "dgf-test-key-0001".to_string(),
            payload,
            delivery_destination: None,
            ttl_minutes: 1.0,
            source_channel: "chain".to_string(),
            received_at: None,
            resolved_user_id: None,
            response_channels: BTreeSet::new(),
            response_topic: None,
        }
    }

    #[tokio::test]
    async fn adds_two_operands() {
        let mut handler = ArithmeticHandler;
        let response = handler.execute(&request_with("ADD", 1.0, 2.0)).await.expect("execute");
        assert_eq!(response.data.unwrap()["result"], 3.0);
    }

    #[tokio::test]
    async fn multiplies_two_operands() {
        let mut handler = ArithmeticHandler;
        let response = handler.execute(&request_with("MUL", 3.0, 4.0)).await.expect("execute");
        assert_eq!(response.data.unwrap()["result"], 12.0);
    }

    #[tokio::test]
    async fn division_by_zero_fails() {
        let mut handler = ArithmeticHandler;
        let result = handler.execute(&request_with("DIV", 1.0, 0.0)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_operation_fails() {
        let mut handler = ArithmeticHandler;
        let result = handler.execute(&request_with("POW", 2.0, 3.0)).await;
        assert!(result.is_err());
    }
}
