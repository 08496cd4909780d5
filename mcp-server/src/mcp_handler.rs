use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::use_cases::{AdminUseCase, PaymentUseCase, RedemptionUseCase, WheelUseCase};

#[derive(Debug, serde::Deserialize)]
struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id: Some(id.unwrap_or(json!(1))),
        }
    }

    fn failure(id: Option<Value>, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data,
            }),
            id,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, serde::Serialize)]
struct Tool {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

impl Tool {
    fn user(name: &str, description: &str, properties: Value, required: &[&str]) -> Self {
        Tool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required
            }),
        }
    }

    /// Same as `user`, plus the mandatory `admin_token` argument.
    fn admin(name: &str, description: &str, mut properties: Value, required: &[&str]) -> Self {
        if let Some(map) = properties.as_object_mut() {
            map.insert(
                "admin_token".to_string(),
                json!({"type": "string", "description": "Admin console token"}),
            );
        }
        let mut required: Vec<&str> = required.to_vec();
        required.push("admin_token");
        Self::user(name, description, properties, &required)
    }
}

pub struct MCPHandler {
    wheel_use_case: Arc<WheelUseCase>,
    redemption_use_case: Arc<RedemptionUseCase>,
    payment_use_case: Arc<PaymentUseCase>,
    admin_use_case: Arc<AdminUseCase>,
}

impl MCPHandler {
    pub fn new(
        wheel_use_case: Arc<WheelUseCase>,
        redemption_use_case: Arc<RedemptionUseCase>,
        payment_use_case: Arc<PaymentUseCase>,
        admin_use_case: Arc<AdminUseCase>,
    ) -> Self {
        Self {
            wheel_use_case,
            redemption_use_case,
            payment_use_case,
            admin_use_case,
        }
    }

    pub async fn serve<R, W>(self, reader: R, mut writer: W) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(req) => req,
                Err(e) => {
                    warn!("Failed to parse request: {} - Line: {}", e, line);
                    let error_response = JsonRpcResponse::failure(
                        None,
                        -32700,
                        "Parse error".to_string(),
                        Some(json!(e.to_string())),
                    );
                    writeln!(writer, "{}", serde_json::to_string(&error_response)?)?;
                    writer.flush()?;
                    continue;
                }
            };

            let is_notification =
                request.id.is_none() || request.method.starts_with("notifications/");
            if is_notification {
                if request.method == "notifications/initialized" {
                    info!("🎡 Client initialized");
                }
                continue;
            }

            let response = self.handle_request(request).await;
            writeln!(writer, "{}", serde_json::to_string(&response)?)?;
            writer.flush()?;
        }

        Ok(())
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "tools/list" => JsonRpcResponse::success(request.id, json!({ "tools": self.get_tools() })),
            "tools/call" => self.handle_call_tool(request.params, request.id).await,
            _ => JsonRpcResponse::failure(
                Some(request.id.unwrap_or(json!(1))),
                -32601,
                format!("Method not found: {}", request.method),
                None,
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("🎡 Initializing prize wheel MCP server");
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "prize-wheel-mcp-server",
                    "version": "0.1.0"
                }
            }),
        )
    }

    async fn handle_call_tool(&self, params: Option<Value>, id: Option<Value>) -> JsonRpcResponse {
        let id = Some(id.unwrap_or(json!(1)));
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, -32602, "Missing params".to_string(), None);
        };

        let Some(tool_name) = params.get("name").and_then(|n| n.as_str()) else {
            return JsonRpcResponse::failure(id, -32602, "Missing tool name".to_string(), None);
        };

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let arguments_map: HashMap<String, Value> = match serde_json::from_value(arguments) {
            Ok(map) => map,
            Err(e) => {
                return JsonRpcResponse::failure(
                    id,
                    -32602,
                    format!("Invalid arguments: {}", e),
                    None,
                );
            }
        };

        match self.execute_tool(tool_name, &arguments_map).await {
            Ok(content) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [
                        {
                            "type": "text",
                            "text": content
                        }
                    ]
                }),
            ),
            Err(e) => {
                warn!(tool = tool_name, "tool failed: {}", e);
                JsonRpcResponse::failure(id, -32603, format!("Tool execution error: {}", e), None)
            }
        }
    }

    async fn execute_tool(&self, tool_name: &str, arguments: &HashMap<String, Value>) -> Result<String> {
        match tool_name {
            "spin" => self.wheel_use_case.spin(arguments).await,
            "get_balance" => self.wheel_use_case.get_balance(arguments).await,
            "list_prizes" => self.wheel_use_case.list_prizes(arguments).await,
            "get_spin_cost" => self.wheel_use_case.get_spin_cost(arguments).await,
            "get_spin_history" => self.wheel_use_case.get_spin_history(arguments).await,
            "get_my_tickets" => self.wheel_use_case.get_my_tickets(arguments).await,
            "get_redemption_form" => self.redemption_use_case.get_redemption_form(arguments).await,
            "redeem_ticket" => self.redemption_use_case.redeem_ticket(arguments).await,
            "purchase_credits" => self.payment_use_case.purchase_credits(arguments).await,
            "get_transaction_history" => self.payment_use_case.get_transaction_history(arguments).await,
            "create_user" => self.admin_use_case.create_user(arguments).await,
            "adjust_credits" => self.admin_use_case.adjust_credits(arguments).await,
            "upsert_prize" => self.admin_use_case.upsert_prize(arguments).await,
            "delete_prize" => self.admin_use_case.delete_prize(arguments).await,
            "set_spin_cost" => self.admin_use_case.set_spin_cost(arguments).await,
            "set_credits_per_purchase" => self.admin_use_case.set_credits_per_purchase(arguments).await,
            "search_ticket" => self.admin_use_case.search_ticket(arguments).await,
            "list_redemptions" => self.admin_use_case.list_redemptions(arguments).await,
            "update_redemption_status" => self.admin_use_case.update_redemption_status(arguments).await,
            "delete_redemption" => self.admin_use_case.delete_redemption(arguments).await,
            "generate_and_save_report" => self.admin_use_case.generate_and_save_report(arguments).await,
            _ => Err(anyhow::anyhow!("Unknown tool: {}", tool_name)),
        }
    }

    fn get_tools(&self) -> Vec<Tool> {
        let user_id = json!({"type": "string", "description": "Id of the user"});
        let ticket_id = json!({"type": "string", "description": "Prize ticket token, e.g. PRIZE-LX2K9A-7F3Q0ZP1MC"});
        let redemption_id = json!({"type": "integer", "description": "Redemption request id"});

        vec![
            Tool::user(
                "spin",
                "Spin the prize wheel once, paying the configured spin cost",
                json!({ "user_id": user_id }),
                &["user_id"],
            ),
            Tool::user(
                "get_balance",
                "Get the credit balance of a user",
                json!({ "user_id": user_id }),
                &["user_id"],
            ),
            Tool::user(
                "list_prizes",
                "List the configured wheel prizes with their weights and draw share",
                json!({}),
                &[],
            ),
            Tool::user(
                "get_spin_cost",
                "Get the number of credits charged per spin",
                json!({}),
                &[],
            ),
            Tool::user(
                "get_spin_history",
                "Get the most recent spins of a user",
                json!({
                    "user_id": user_id,
                    "limit": {"type": "integer", "description": "Number of spins to return (1-100, default: 20)"}
                }),
                &["user_id"],
            ),
            Tool::user(
                "get_my_tickets",
                "List the prize tickets a user has won",
                json!({ "user_id": user_id }),
                &["user_id"],
            ),
            Tool::user(
                "get_redemption_form",
                "Get the form fields required to redeem a prize ticket",
                json!({ "ticket_id": ticket_id }),
                &["ticket_id"],
            ),
            Tool::user(
                "redeem_ticket",
                "Submit a redemption request for a won prize ticket",
                json!({
                    "user_id": user_id,
                    "ticket_id": ticket_id,
                    "form_data": {
                        "type": "object",
                        "description": "Field name to value, as listed by get_redemption_form",
                        "additionalProperties": {"type": "string"}
                    }
                }),
                &["user_id", "ticket_id", "form_data"],
            ),
            Tool::user(
                "purchase_credits",
                "Pay through the mobile-money relay and receive purchase credits",
                json!({
                    "user_id": user_id,
                    "amount": {"type": "integer", "description": "Amount to charge"},
                    "number_phone": {"type": "string", "description": "Mobile-money phone number"}
                }),
                &["user_id", "amount", "number_phone"],
            ),
            Tool::user(
                "get_transaction_history",
                "List a user's payment attempts, newest first",
                json!({
                    "user_id": user_id,
                    "limit": {"type": "integer", "description": "Number of transactions to return (1-100, default: 20)"}
                }),
                &["user_id"],
            ),
            Tool::admin(
                "create_user",
                "Create a user account",
                json!({
                    "user_id": user_id,
                    "display_name": {"type": "string", "description": "Name shown on tickets"},
                    "phone": {"type": "string", "description": "Contact phone"},
                    "credits": {"type": "integer", "description": "Starting balance (default: 0)"}
                }),
                &["user_id", "display_name"],
            ),
            Tool::admin(
                "adjust_credits",
                "Add or remove credits from a user",
                json!({
                    "user_id": user_id,
                    "delta": {"type": "integer", "description": "Signed credit change"}
                }),
                &["user_id", "delta"],
            ),
            Tool::admin(
                "upsert_prize",
                "Create or update a wheel prize",
                json!({
                    "id": {"type": "string", "description": "Prize id; omitted to create a new prize"},
                    "name": {"type": "string", "description": "Prize name"},
                    "image": {"type": "string", "description": "Image URL"},
                    "probability": {"type": "number", "description": "Positive relative weight"}
                }),
                &["name", "probability"],
            ),
            Tool::admin(
                "delete_prize",
                "Remove a prize from the wheel",
                json!({ "id": {"type": "string", "description": "Prize id"} }),
                &["id"],
            ),
            Tool::admin(
                "set_spin_cost",
                "Set the number of credits charged per spin",
                json!({ "cost": {"type": "integer", "description": "Non-negative spin cost"} }),
                &["cost"],
            ),
            Tool::admin(
                "set_credits_per_purchase",
                "Set the credits awarded for each settled purchase",
                json!({ "credits": {"type": "integer", "description": "Positive credit reward"} }),
                &["credits"],
            ),
            Tool::admin(
                "search_ticket",
                "Look up a won prize ticket by its token",
                json!({ "ticket_id": ticket_id }),
                &["ticket_id"],
            ),
            Tool::admin(
                "list_redemptions",
                "List redemption requests, optionally filtered by status",
                json!({
                    "status": {"type": "string", "enum": ["pending", "success", "rejected"]}
                }),
                &[],
            ),
            Tool::admin(
                "update_redemption_status",
                "Approve or reject a pending redemption request",
                json!({
                    "redemption_id": redemption_id,
                    "status": {"type": "string", "enum": ["success", "rejected"]}
                }),
                &["redemption_id", "status"],
            ),
            Tool::admin(
                "delete_redemption",
                "Delete a redemption request",
                json!({ "redemption_id": redemption_id }),
                &["redemption_id"],
            ),
            Tool::admin(
                "generate_and_save_report",
                "Generate and save the HTML wheel statistics report",
                json!({}),
                &[],
            ),
        ]
    }
}

pub fn stdio() -> (BufReader<io::Stdin>, io::Stdout) {
    (BufReader::new(io::stdin()), io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prize_wheel::SpinService;
    use prize_wheel::database::create_database_with_connection;
    use rusqlite::Connection;
    use std::io::Cursor;
    use std::sync::Mutex;

    fn service() -> Arc<SpinService> {
        let conn = Connection::open_in_memory().unwrap();
        create_database_with_connection(&conn).unwrap();
        Arc::new(SpinService::new(Arc::new(Mutex::new(conn))))
    }

    fn handler(service: &Arc<SpinService>) -> MCPHandler {
        let report_dir = std::env::temp_dir()
            .join(format!("prize-wheel-mcp-{}", std::process::id()))
            .to_string_lossy()
            .to_string();

        MCPHandler::new(
            Arc::new(WheelUseCase::new(Arc::clone(service))),
            Arc::new(RedemptionUseCase::new(Arc::clone(service))),
            Arc::new(PaymentUseCase::new(Arc::clone(service), None)),
            Arc::new(AdminUseCase::new(
                Arc::clone(service),
                Some("s3cret".to_string()),
                report_dir,
            )),
        )
    }

    async fn run(service: &Arc<SpinService>, lines: &[Value]) -> Vec<Value> {
        let input = lines
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        run_raw(service, &input).await
    }

    async fn run_raw(service: &Arc<SpinService>, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        handler(service)
            .serve(Cursor::new(input.to_string()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn call(id: i64, name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
    }

    fn text(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn protocol_errors_use_json_rpc_codes() {
        let responses = run_raw(
            &service(),
            "not json\n\
             {\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\
             {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"bogus\"}\n\
             {\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\"}\n\
             {\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"tools/call\",\"params\":{\"name\":\"nope\"}}",
        )
        .await;

        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["error"]["code"], -32601);
        assert_eq!(responses[2]["error"]["code"], -32602);
        assert_eq!(responses[3]["error"]["code"], -32603);
        assert_eq!(responses[3]["id"], 4);
    }

    #[tokio::test]
    async fn lists_every_tool() {
        let responses = run(&service(), &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        ])
        .await;

        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "prize-wheel-mcp-server");
        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 21);
        let create_user = tools.iter().find(|t| t["name"] == "create_user").unwrap();
        assert!(create_user["inputSchema"]["required"]
            .as_array()
            .unwrap()
            .contains(&json!("admin_token")));
    }

    #[tokio::test]
    async fn admin_tools_require_the_token() {
        let user = json!({"user_id": "u1", "display_name": "Ana", "credits": 10});
        let mut with_bad_token = user.clone();
        with_bad_token["admin_token"] = json!("guess");
        let mut with_token = user.clone();
        with_token["admin_token"] = json!("s3cret");

        let responses = run(&service(), &[
            call(1, "create_user", user),
            call(2, "create_user", with_bad_token),
            call(3, "create_user", with_token),
        ])
        .await;

        assert_eq!(responses[0]["error"]["code"], -32603);
        assert_eq!(responses[1]["error"]["code"], -32603);
        assert_eq!(text(&responses[2])["user"]["credits"], 10);
    }

    #[tokio::test]
    async fn spin_win_and_redeem_over_the_wire() {
        let service = service();
        let responses = run(&service, &[
            call(1, "create_user", json!({"admin_token": "s3cret", "user_id": "u1", "display_name": "Ana", "credits": 10})),
            call(2, "upsert_prize", json!({"admin_token": "s3cret", "id": "gc", "name": "Steam Gift Card", "probability": 5})),
            call(3, "spin", json!({"user_id": "u1"})),
            call(4, "spin", json!({"user_id": "u1"})),
        ])
        .await;

        let receipt = text(&responses[2]);
        assert_eq!(receipt["isWinner"], true);
        assert_eq!(receipt["receipt"]["balance"], 0);
        assert_eq!(responses[3]["error"]["code"], -32603);
        let ticket_id = receipt["receipt"]["ticket"]["ticketId"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(ticket_id.starts_with("PRIZE-"));

        let responses = run(&service, &[
            call(1, "get_redemption_form", json!({"ticket_id": ticket_id})),
            call(2, "redeem_ticket", json!({"user_id": "u1", "ticket_id": ticket_id, "form_data": {}})),
            call(3, "redeem_ticket", json!({"user_id": "u1", "ticket_id": ticket_id, "form_data": {"email": "ana@example.com"}})),
            call(4, "redeem_ticket", json!({"user_id": "u1", "ticket_id": ticket_id, "form_data": {"email": "ana@example.com"}})),
            call(5, "list_redemptions", json!({"admin_token": "s3cret", "status": "pending"})),
        ])
        .await;

        assert_eq!(text(&responses[0])["form"]["category"], "giftcard");
        assert_eq!(responses[1]["error"]["code"], -32603);
        assert_eq!(text(&responses[2])["redemption"]["status"], "pending");
        assert_eq!(responses[3]["error"]["code"], -32603);
        assert_eq!(text(&responses[4])["redemptions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purchases_are_disabled_without_relay() {
        let responses = run(&service(), &[call(
            1,
            "purchase_credits",
            json!({"user_id": "u1", "amount": 100, "number_phone": "841234567"}),
        )])
        .await;
        let message = responses[0]["error"]["message"].as_str().unwrap();
        assert!(message.contains("PRIZE_WHEEL_RELAY_URL"));
    }

    #[tokio::test]
    async fn histories_honour_clamped_limits() {
        let service = service();
        let responses = run(&service, &[
            call(1, "create_user", json!({"admin_token": "s3cret", "user_id": "u1", "display_name": "Ana", "credits": 30})),
            call(2, "upsert_prize", json!({"admin_token": "s3cret", "id": "a", "name": "Netflix", "probability": 1})),
            call(3, "spin", json!({"user_id": "u1"})),
            call(4, "spin", json!({"user_id": "u1"})),
            call(5, "get_spin_history", json!({"user_id": "u1", "limit": -1})),
            call(6, "get_spin_history", json!({"user_id": "u1"})),
            call(7, "get_transaction_history", json!({"user_id": "u1"})),
        ])
        .await;

        assert_eq!(text(&responses[4])["spins"].as_array().unwrap().len(), 1);
        assert_eq!(text(&responses[5])["spins"].as_array().unwrap().len(), 2);
        assert!(text(&responses[6])["transactions"].as_array().unwrap().is_empty());
    }
}
