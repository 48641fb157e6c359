//! MCP server loop over newline-delimited JSON-RPC.
//!
//! Requests are read line by line. `tools/call` runs on its own task so a
//! long debugger command does not hold up other sessions; everything else is
//! answered inline. Responses funnel through a single writer task.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use protocol::{
    initialize_result, LineCodec, ProtocolError, Request, RequestId, Response, RpcError,
    ServerInfo, ToolDefinition, ToolResult,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Handles `tools/list` and `tools/call`.
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    /// Tool catalog.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Run a tool. `Err` becomes a JSON-RPC error; tool-level failures are
    /// `Ok` results with `isError` set.
    async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult, RpcError>;
}

/// Why [`McpServer::serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Input reached end of file.
    Eof,
    /// A shutdown signal arrived.
    Shutdown,
}

/// MCP server bound to a tool handler.
pub struct McpServer<H> {
    handler: Arc<H>,
    info: ServerInfo,
    codec: LineCodec,
}

impl<H> Clone for McpServer<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            info: self.info.clone(),
            codec: self.codec,
        }
    }
}

impl<H: ToolHandler> McpServer<H> {
    pub fn new(handler: Arc<H>, info: ServerInfo) -> Self {
        Self {
            handler,
            info,
            codec: LineCodec::new(),
        }
    }

    /// Use `codec` for framing and its line size limit.
    pub fn with_codec(mut self, codec: LineCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Serve on the process's stdin and stdout.
    pub async fn run_stdio(
        &self,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<StopReason, ProtocolError> {
        self.serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown,
        )
        .await
    }

    /// Serve until `reader` hits EOF or `shutdown` fires.
    ///
    /// On EOF, in-flight tool calls are awaited and their responses written.
    /// On shutdown they are aborted.
    pub async fn serve<R, W>(
        &self,
        mut reader: R,
        writer: W,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<StopReason, ProtocolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Response>();
        let writer_task = tokio::spawn(write_responses(self.codec, writer, rx));

        let mut in_flight = JoinSet::new();
        let mut lines = LineReader::new(self.codec.max_frame_size());
        let mut shutdown_open = true;

        let outcome = loop {
            tokio::select! {
                signal = shutdown.recv(), if shutdown_open => {
                    if let Err(broadcast::error::RecvError::Closed) = signal {
                        shutdown_open = false;
                        continue;
                    }
                    info!("Shutdown requested, stopping MCP server");
                    break Ok(StopReason::Shutdown);
                }
                read = lines.next_line(&mut reader) => {
                    match read {
                        Ok(ReadLine::Eof) => {
                            debug!("Input closed");
                            break Ok(StopReason::Eof);
                        }
                        Ok(ReadLine::Line) => {
                            self.dispatch(lines.line(), &tx, &mut in_flight);
                            lines.clear();
                        }
                        Ok(ReadLine::Oversized(size)) => {
                            warn!(size, "Dropping oversized input line");
                            let err = ProtocolError::FrameTooLarge {
                                size,
                                max: self.codec.max_frame_size(),
                            };
                            let response = Response::failure(RequestId::Null, RpcError::from(err));
                            let _ = tx.send(response);
                            lines.clear();
                        }
                        Err(e) => break Err(ProtocolError::from(e)),
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Tool call task failed");
                    }
                }
            }
        };

        match outcome {
            Ok(StopReason::Eof) => {
                while let Some(joined) = in_flight.join_next().await {
                    if let Err(e) = joined {
                        warn!(error = %e, "Tool call task failed");
                    }
                }
            }
            _ => in_flight.abort_all(),
        }

        drop(tx);
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Response writer stopped"),
            Err(e) => warn!(error = %e, "Response writer task failed"),
        }

        outcome
    }

    fn dispatch(
        &self,
        line: &[u8],
        tx: &mpsc::UnboundedSender<Response>,
        in_flight: &mut JoinSet<()>,
    ) {
        let request = match self.parse(line) {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(response) => {
                let _ = tx.send(response);
                return;
            }
        };

        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "Notification");
            return;
        };

        if request.method == "tools/call" {
            let server = self.clone();
            let tx = tx.clone();
            in_flight.spawn(async move {
                let response = server.call_tool(id, request.params).await;
                let _ = tx.send(response);
            });
        } else {
            let _ = tx.send(self.handle(id, &request));
        }
    }

    /// `Ok(None)` for blank lines, `Err` with a ready error response otherwise.
    fn parse(&self, line: &[u8]) -> Result<Option<Request>, Response> {
        let value: Value = match self.codec.decode(line) {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(e) => return Err(Response::failure(RequestId::Null, RpcError::from(e))),
        };

        let id = value
            .get("id")
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())
            .unwrap_or(RequestId::Null);

        let request: Request = serde_json::from_value(value)
            .map_err(|e| Response::failure(id.clone(), RpcError::InvalidRequest(e.to_string())))?;
        request
            .validate()
            .map_err(|e| Response::failure(id, RpcError::from(e)))?;

        Ok(Some(request))
    }

    fn handle(&self, id: RequestId, request: &Request) -> Response {
        debug!(method = %request.method, "Request");
        match request.method.as_str() {
            "initialize" => {
                info!("Client initialized");
                Response::success(id, initialize_result(&self.info))
            }
            "ping" => Response::success(id, json!({})),
            "tools/list" => Response::success(id, json!({ "tools": self.handler.tools() })),
            other => Response::failure(id, RpcError::MethodNotFound(other.to_string())),
        }
    }

    async fn call_tool(&self, id: RequestId, params: Option<Value>) -> Response {
        let params = params.unwrap_or(Value::Null);
        let Some(name) = params.get("name").and_then(|n| n.as_str()) else {
            return Response::failure(
                id,
                RpcError::InvalidParams("Missing tool name".to_string()),
            );
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        debug!(tool = %name, "Tool call");
        match self.handler.call(name, arguments).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => Response::success(id, value),
                Err(e) => Response::failure(id, RpcError::InternalError(e.to_string())),
            },
            Err(e) => Response::failure(id, e),
        }
    }
}

/// Result of [`LineReader::next_line`].
#[derive(Debug, PartialEq, Eq)]
enum ReadLine {
    Eof,
    /// A line is ready in [`LineReader::line`].
    Line,
    /// A line over the limit was skipped; carries its size in bytes.
    Oversized(usize),
}

/// Splits input into lines, holding at most one limit's worth of bytes.
///
/// State lives in the struct and bytes are consumed only once copied or
/// counted, so `next_line` is cancel safe.
struct LineReader {
    buf: Vec<u8>,
    skipped: usize,
    max: usize,
}

impl LineReader {
    fn new(max: usize) -> Self {
        Self {
            buf: Vec::new(),
            skipped: 0,
            max,
        }
    }

    fn line(&self) -> &[u8] {
        &self.buf
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.skipped = 0;
    }

    async fn next_line<R>(&mut self, reader: &mut R) -> io::Result<ReadLine>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(if self.skipped > 0 {
                    ReadLine::Oversized(self.skipped)
                } else if self.buf.is_empty() {
                    ReadLine::Eof
                } else {
                    ReadLine::Line
                });
            }

            let (used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };

            // Room for the limit plus "\r\n"; the codec checks the exact size.
            if self.skipped == 0 && self.buf.len() + used <= self.max + 2 {
                self.buf.extend_from_slice(&available[..used]);
            } else {
                self.skipped += self.buf.len() + used;
                self.buf.clear();
            }
            reader.consume(used);

            if complete {
                return Ok(if self.skipped > 0 {
                    ReadLine::Oversized(self.skipped)
                } else {
                    ReadLine::Line
                });
            }
        }
    }
}

async fn write_responses<W>(
    codec: LineCodec,
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Response>,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let line = codec.encode(&response)?;
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    struct EchoTools;

    #[async_trait]
    impl ToolHandler for EchoTools {
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::new(
                "echo",
                "Echo the text argument",
                json!({ "type": "object", "properties": { "text": { "type": "string" } } }),
            )]
        }

        async fn call(&self, name: &str, arguments: Value) -> Result<ToolResult, RpcError> {
            match name {
                "echo" => Ok(ToolResult::text(
                    arguments["text"].as_str().unwrap_or_default(),
                )),
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(ToolResult::text("slow done"))
                }
                "fail" => Ok(ToolResult::error("it failed")),
                other => Err(RpcError::InvalidParams(format!("Unknown tool: {}", other))),
            }
        }
    }

    fn server() -> McpServer<EchoTools> {
        McpServer::new(
            Arc::new(EchoTools),
            ServerInfo {
                name: "test".to_string(),
                version: "0.0.0".to_string(),
            },
        )
    }

    /// Feed `input` and collect every response line.
    async fn run(input: &str) -> Vec<Value> {
        let (out_w, mut out_r) = duplex(64 * 1024);
        let (_tx, shutdown) = broadcast::channel(1);
        let reason = server()
            .serve(BufReader::new(input.as_bytes()), out_w, shutdown)
            .await
            .unwrap();
        assert_eq!(reason, StopReason::Eof);

        let mut output = String::new();
        out_r.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn by_id(responses: &[Value], id: i64) -> &Value {
        responses
            .iter()
            .find(|r| r["id"] == id)
            .unwrap_or_else(|| panic!("no response for id {}", id))
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let responses = run(input).await;
        assert_eq!(responses.len(), 2);

        let init = by_id(&responses, 1);
        assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(init["result"]["serverInfo"]["name"], "test");

        let list = by_id(&responses, 2);
        assert_eq!(list["result"]["tools"][0]["name"], "echo");
        assert!(list["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"text":"hi"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"fail"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{}}"#,
            "\n",
        );
        let responses = run(input).await;
        assert_eq!(responses.len(), 4);

        let ok = by_id(&responses, 1);
        assert_eq!(ok["result"]["content"][0]["type"], "text");
        assert_eq!(ok["result"]["content"][0]["text"], "hi");
        assert!(ok["result"].get("isError").is_none());

        let failed = by_id(&responses, 2);
        assert_eq!(failed["result"]["isError"], true);

        assert_eq!(by_id(&responses, 3)["error"]["code"], -32602);
        assert_eq!(by_id(&responses, 4)["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_errors() {
        let input = concat!(
            "not json\n",
            r#"{"jsonrpc":"2.0","id":7,"method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"1.0","id":8,"method":"ping"}"#,
            "\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#,
            "\n",
        );
        let responses = run(input).await;
        assert_eq!(responses.len(), 4);

        let parse_error = responses.iter().find(|r| r["id"].is_null()).unwrap();
        assert_eq!(parse_error["error"]["code"], -32700);
        assert_eq!(by_id(&responses, 7)["error"]["code"], -32601);
        assert_eq!(by_id(&responses, 8)["error"]["code"], -32600);
        assert_eq!(by_id(&responses, 9)["result"], json!({}));
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected_without_buffering() {
        let long = format!(
            r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#,
            "x".repeat(500)
        );
        let input = format!("{}\n{}\n", long, r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);

        let (out_w, mut out_r) = duplex(64 * 1024);
        let (_tx, shutdown) = broadcast::channel(1);
        // A small read buffer so the long line arrives in many chunks.
        let reader = BufReader::with_capacity(16, input.as_bytes());
        let reason = server()
            .with_codec(LineCodec::with_max_frame_size(64))
            .serve(reader, out_w, shutdown)
            .await
            .unwrap();
        assert_eq!(reason, StopReason::Eof);

        let mut output = String::new();
        out_r.read_to_string(&mut output).await.unwrap();
        let responses: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert_eq!(by_id(&responses, 2)["result"], json!({}));
    }

    #[tokio::test]
    async fn test_line_reader_caps_buffer() {
        let mut reader = BufReader::with_capacity(4, &b"abcdefghij\nok\ntail"[..]);
        let mut lines = LineReader::new(4);

        assert_eq!(lines.next_line(&mut reader).await.unwrap(), ReadLine::Oversized(11));
        assert!(lines.line().is_empty());
        lines.clear();

        assert_eq!(lines.next_line(&mut reader).await.unwrap(), ReadLine::Line);
        assert_eq!(lines.line(), b"ok\n");
        lines.clear();

        assert_eq!(lines.next_line(&mut reader).await.unwrap(), ReadLine::Line);
        assert_eq!(lines.line(), b"tail");
        lines.clear();

        assert_eq!(lines.next_line(&mut reader).await.unwrap(), ReadLine::Eof);
    }

    #[tokio::test]
    async fn test_slow_call_does_not_block_ping() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"slow"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let responses = run(input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 2);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "slow done");
    }

    #[tokio::test]
    async fn test_shutdown_stops_server() {
        let (_client, server_side) = duplex(1024);
        let (reader, writer) = tokio::io::split(server_side);
        let (tx, shutdown) = broadcast::channel(1);

        let srv = server();
        let handle =
            tokio::spawn(async move { srv.serve(BufReader::new(reader), writer, shutdown).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reason, StopReason::Shutdown);
    }
}
