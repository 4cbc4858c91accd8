use std::fmt::Display;
use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{
    constants::{INPUT_QUEUE_CAPACITY, OUTPUT_QUEUE_CAPACITY},
    core::{
        context::RunContext,
        domain::ExecRequest,
        service::{ExecutionError, ExecutionService},
    },
    http::AppState,
};

pub async fn execute_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        serve_session(sink, stream, state.service).await;
    })
}

/// Drives one interactive session: the first message is the request, every
/// later one is a line of input, and output lines flow back as text messages.
#[tracing::instrument(skip_all)]
pub async fn serve_session<Si, St>(mut sink: Si, mut stream: St, service: Arc<ExecutionService>)
where
    Si: Sink<Message> + Unpin + Send,
    Si::Error: Display,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    let Some(request) = read_request(&mut stream).await else {
        tracing::debug!("client left before sending a request");
        return;
    };
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            tracing::info!(error = %e, "malformed request");
            let text = format!("Execution error: invalid request: {}", e);
            finish(&mut sink, text, "").await;
            return;
        }
    };

    let ctx = RunContext::new();
    let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
    let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);

    let reader = tokio::spawn(relay_client_input(stream, input_tx, ctx.clone()));

    let execution = service.execute_interactive(&ctx, request, input_rx, output_tx);
    let (result, sink_open) = tokio::join!(execution, relay_output(&mut sink, output_rx, &ctx));

    // The run is over; stop listening for input.
    ctx.cancel();
    if let Err(e) = reader.await {
        tracing::error!(error = %e, "input reader failed");
    }

    if !sink_open {
        return;
    }
    match result {
        Ok(()) => finish(&mut sink, "Execution finished".to_string(), "").await,
        Err(e) => {
            let reason = match e {
                ExecutionError::TimedOut { .. } => "Execution timeout",
                _ => "",
            };
            finish(&mut sink, format!("Execution error: {}", e), reason).await;
        }
    }
}

async fn read_request<St>(stream: &mut St) -> Option<Result<ExecRequest, serde_json::Error>>
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str())),
            Ok(Message::Binary(bytes)) => return Some(serde_json::from_slice(&bytes)),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "failed to read request");
                return None;
            }
        }
    }
    None
}

async fn relay_client_input<St>(mut stream: St, input: Sender<String>, ctx: RunContext)
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = ctx.done() => return,
            message = stream.next() => message,
        };
        let line = match message {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!("client closed the connection");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "failed to read from client");
                break;
            }
        };

        tokio::select! {
            biased;
            _ = ctx.done() => return,
            sent = input.send(line) => {
                if sent.is_err() {
                    tracing::debug!("process no longer accepts input");
                }
            }
        }
    }

    drop(input);
    ctx.cancel();
}

/// Forwards output until the run drops its sender. Returns whether the client
/// can still be written to.
async fn relay_output<Si>(sink: &mut Si, mut output: Receiver<String>, ctx: &RunContext) -> bool
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let mut open = true;
    while let Some(line) = output.recv().await {
        if !open {
            continue;
        }
        if let Err(e) = sink.send(Message::Text(line.into())).await {
            tracing::debug!(error = %e, "failed to write to client");
            open = false;
            ctx.cancel();
        }
    }
    open
}

async fn finish<Si>(sink: &mut Si, text: String, reason: &str)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    if let Err(e) = sink.send(Message::Text(text.into())).await {
        tracing::debug!(error = %e, "failed to send final message");
        return;
    }
    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: reason.into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "failed to send close frame");
    }
}
