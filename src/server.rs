//! Newline-delimited JSON transport: one request per line in, one response per
//! line out, in order.

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::api::{self, Request, Response};
use crate::engine::Engine;
use crate::limits::MAX_REQUEST_LINE_LEN;
use crate::observability::{REQUEST_DURATION_SECONDS, REQUESTS_TOTAL, request_label};

/// Parse and run one request line.
pub async fn handle_line(engine: &Engine, line: &str) -> Response {
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => "unparsed", "status" => "400").increment(1);
            return Response::bad_request(format!("malformed request: {e}"));
        }
    };

    let op = request_label(&req);
    let start = Instant::now();
    let resp = api::handle(engine, req).await;
    metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => op).record(start.elapsed().as_secs_f64());
    metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => resp.status.to_string()).increment(1);
    debug!("{op} -> {}", resp.status);
    resp
}

/// Serve one client until it disconnects. Requests on a connection run one at
/// a time.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_REQUEST_LINE_LEN));

    while let Some(frame) = framed.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let resp = Response::bad_request(format!(
                    "request line exceeds {MAX_REQUEST_LINE_LEN} bytes"
                ));
                framed.send(serde_json::to_string(&resp)?).await?;
                continue;
            }
            Err(LinesCodecError::Io(e)) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = handle_line(&engine, &line).await;
        framed.send(serde_json::to_string(&resp)?).await?;
    }
    Ok(())
}
