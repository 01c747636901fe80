use futures_util::{stream, StreamExt};
use std::sync::Arc;
use streamgate::buffer::Buffer;
use streamgate::pricing::QuotaTable;
use streamgate::streaming::{channel_hook, fragments_from_reader, StreamHandler};
use streamgate::types::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn buffer(model: &str, history: &[Message]) -> Buffer {
    Buffer::new(model, history, Arc::new(QuotaTable::default()))
}

async fn run(raw: &str, buf: &mut Buffer, legacy: bool) -> (Result<()>, Vec<String>) {
    let mut out = Vec::new();
    let cancel = CancellationToken::new();
    let result = StreamHandler::handle_stream(
        fragments_from_reader(raw.as_bytes()),
        buf,
        legacy,
        &cancel,
        |text: &str| {
            out.push(text.to_string());
            Ok(())
        },
    )
    .await;
    (result, out)
}

#[tokio::test]
async fn test_sse_capture_with_split_fragment() {
    let raw = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n",
        "\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"The \"}}]}\n",
        "data: {\"choi\n",
        "ces\":[{\"delta\":{\"content\":\"answer\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
        "data: [DONE]\n",
    );
    let mut buf = buffer("gpt-3.5-turbo", &[Message::user("what is it?")]);
    let start_quota = buf.get_quota();

    let (result, out) = run(raw, &mut buf, false).await;

    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(out, vec!["The ", "answer"]);
    assert_eq!(buf.read(), "The answer");
    assert_eq!(buf.cursor(), "The answer".len());
    assert_eq!(buf.write_count(), 4);
    assert!(buf.get_quota() > start_quota);
}

#[tokio::test]
async fn test_delta_quoting_data_prefix_is_kept() {
    let raw = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"ok \"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"data: {x}\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"\\nexport default { data: { return {} } }\"}}]}\n",
        "data: [DONE]\n",
    );
    let mut buf = buffer("gpt-4", &[]);
    let (result, out) = run(raw, &mut buf, false).await;

    assert!(result.is_ok());
    assert_eq!(
        out,
        vec!["ok ", "data: {x}", "\nexport default { data: { return {} } }"]
    );
    assert_eq!(buf.write_count(), 3);
}

#[tokio::test]
async fn test_legacy_completion_stream() {
    let raw = concat!(
        "data: {\"choices\":[{\"text\":\"foo\",\"index\":0}]}\n",
        "data: {\"choices\":[{\"text\":\"bar\",\"index\":0}]}\n",
        "data: [DONE]\n",
    );
    let mut buf = buffer("gpt-3.5-turbo-instruct", &[]);
    let (result, out) = run(raw, &mut buf, true).await;
    assert!(result.is_ok());
    assert_eq!(out.concat(), "foobar");
}

#[tokio::test]
async fn test_upstream_error_mid_stream_keeps_partial_output() {
    let raw = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
        "data: {\"error\":{\"message\":\"That model is currently overloaded\",\"type\":\"server_error\"}}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n",
    );
    let mut buf = buffer("gpt-4", &[]);
    let (result, out) = run(raw, &mut buf, false).await;

    match result.map_err(|e| e.inner) {
        Err(GatewayError::Upstream { message, kind }) => {
            assert_eq!(message, "That model is currently overloaded");
            assert_eq!(kind, "server_error");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
    assert_eq!(out, vec!["partial"]);
    assert_eq!(buf.read(), "partial");
}

#[tokio::test]
async fn test_plain_string_error_defaults_kind() {
    let raw = "{\"error\":\"invalid api key\"}\n";
    let mut buf = buffer("gpt-4", &[]);
    let (result, _) = run(raw, &mut buf, false).await;
    match result.map_err(|e| e.inner) {
        Err(GatewayError::Upstream { message, kind }) => {
            assert_eq!(message, "invalid api key");
            assert_eq!(kind, "unknown");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tool_call_stream() {
    let raw = concat!(
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_9\",\"type\":\"function\",\"function\":{\"name\":\"lookup\",\"arguments\":\"\"}}]}}]}\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
        "data: [DONE]\n",
    );
    let mut buf = buffer("gpt-4", &[]);
    let (result, out) = run(raw, &mut buf, false).await;

    assert!(result.is_ok());
    assert!(out.is_empty());
    assert!(buf.is_function_calling());
    assert!(!buf.is_empty());
    assert_eq!(buf.read_with_default("fallback"), "");
    let id = buf.tool_calls().and_then(|c| c.first()).and_then(|c| c.id.clone());
    assert_eq!(id.as_deref(), Some("call_9"));
}

#[tokio::test]
async fn test_unparsable_tail_after_output_is_dropped() {
    let raw = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"done\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"conte\n",
    );
    let mut buf = buffer("gpt-4", &[]);
    let (result, out) = run(raw, &mut buf, false).await;
    assert!(result.is_ok());
    assert_eq!(out, vec!["done"]);
}

#[tokio::test]
async fn test_channel_hook_and_dropped_receiver() {
    let raw = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        "data: [DONE]\n",
    );
    let cancel = CancellationToken::new();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut buf = buffer("gpt-4", &[]);
    let result = StreamHandler::handle_stream(
        fragments_from_reader(raw.as_bytes()),
        &mut buf,
        false,
        &cancel,
        channel_hook(tx),
    )
    .await;
    assert!(result.is_ok());
    let mut received = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        received.push(chunk);
    }
    assert_eq!(received, vec!["a", "b"]);

    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let mut buf = buffer("gpt-4", &[]);
    let result = StreamHandler::handle_stream(
        fragments_from_reader(raw.as_bytes()),
        &mut buf,
        false,
        &cancel,
        channel_hook(tx),
    )
    .await;
    assert!(matches!(result.map_err(|e| e.inner), Err(GatewayError::Hook(_))));
}

#[tokio::test]
async fn test_cancel_from_sink_stops_a_stalled_stream() {
    let first = vec![Ok::<_, std::io::Error>(
        "data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}".to_string(),
    )];
    // Yields one fragment, then never produces another.
    let fragments = stream::iter(first).chain(stream::pending());
    let fragments = Box::pin(fragments);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mut buf = buffer("gpt-4", &[]);
    let result = StreamHandler::handle_stream(fragments, &mut buf, false, &cancel, |_: &str| {
        trigger.cancel();
        Ok(())
    })
    .await;

    assert!(result.err().map(|e| e.is_cancelled()).unwrap_or(false));
    assert_eq!(buf.read(), "first");
}

#[tokio::test]
async fn test_vision_history_is_billed_for_images() {
    let image = Image::new("https://img.example/a.png").with_size(1024, 1024);
    let mut message = Message::user("describe this");
    message.attachments.push(image.clone());

    let plain = buffer("gpt-4o", &[Message::user("describe this")]);
    let with_image = buffer("gpt-4o", &[message]);
    assert!(with_image.count_input_tokens() > plain.count_input_tokens());
    assert_eq!(
        with_image.count_input_tokens() - plain.count_input_tokens(),
        image.count_tokens("gpt-4o") as usize
    );
}
