use chatblocks::api::mock_client::MockApiClient;
use chatblocks::config::{Config, SamplingConfig};
use chatblocks::state::{
    ManualTicks, MessageView, RandomIds, StreamAssembler, SystemClock, ThreadStore,
};
use chatblocks::types::{Block, MessageKind, Role};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config(api_url: &str) -> Config {
    Config {
        api_url: api_url.to_string(),
        sampling: SamplingConfig::default(),
        frame_interval: Duration::from_millis(16),
        store_path: PathBuf::from("threads.json"),
        debug_payload: false,
    }
}

#[test]
fn test_config_validation_rejects_non_http_endpoint() {
    assert!(config("ftp://example.com/ask").validate().is_err());
    assert!(config("http://localhost:5000/api/ask").validate().is_ok());
}

#[test]
fn test_config_validation_rejects_out_of_range_sampling() {
    let mut bad_temperature = config("https://chat.example.com/api/ask");
    bad_temperature.sampling.temperature = 2.5;
    assert!(bad_temperature.validate().is_err());

    let mut bad_top_p = config("https://chat.example.com/api/ask");
    bad_top_p.sampling.top_p = f32::NAN;
    assert!(bad_top_p.validate().is_err());
}

fn load(path: &std::path::Path) -> ThreadStore {
    ThreadStore::load_from_path(path, Arc::new(SystemClock), Arc::new(RandomIds))
        .expect("load store")
}

#[tokio::test]
async fn test_streamed_turn_survives_a_save_and_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("threads.json");

    let mut store = load(&path);
    assert!(store.is_empty());
    let thread_id = store.create_thread();
    let store = Arc::new(Mutex::new(store));

    let mock = MockApiClient::new(vec![vec![
        "event: token\ndata: {\"text\":\"Here is the flow:\"}".to_string(),
        "event: tool\ndata: {\"name\":\"render_mermaid\",\"args\":{\"code\":\"graph TD; A-->B\"}}"
            .to_string(),
        "event: done\ndata: {}".to_string(),
    ]]);
    let assembler = StreamAssembler::new(Arc::new(mock), Arc::clone(&store));

    let mut view = MessageView::default();
    let (mut ticks, _handle) = ManualTicks::channel();
    let outcome = assembler
        .submit(
            &thread_id,
            "Draw a flow\nwith two nodes",
            &mut view,
            &mut ticks,
            CancellationToken::new(),
        )
        .await
        .expect("submit");
    assert!(outcome.error.is_none());
    assert_eq!(view.fragments.len(), 1);
    assert!(view.fragments[0].contains("class=\"mermaid\""));

    store
        .lock()
        .expect("store lock")
        .save_to_path(&path)
        .expect("save store");

    let reloaded = load(&path);
    assert_eq!(reloaded.active_id(), Some(thread_id.as_str()));
    let thread = reloaded.get(&thread_id).expect("thread persisted");
    assert_eq!(thread.title, "Draw a flow");
    assert_eq!(thread.messages.len(), 2);
    assert_eq!(thread.messages[0].role, Role::User);

    let reply = &thread.messages[1];
    assert_eq!(reply.kind(), MessageKind::Blocks);
    assert_eq!(
        reply.blocks().expect("blocks"),
        &[
            Block::Text {
                content: "Here is the flow:".to_string()
            },
            Block::Diagram {
                code: "graph TD; A-->B".to_string()
            }
        ]
    );
}
