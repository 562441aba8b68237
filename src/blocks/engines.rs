//! Lazily loaded rendering engines for chart, diagram and animation blocks.
//!
//! Each block kind that needs an engine has an [`EngineLoader`] registered
//! for it. The first block of that kind loads the engine; later blocks reuse
//! the cached instance. Loads that fail are not cached and are retried by
//! the next block.

use super::error::{EngineUnavailableSnafu, InvalidSpecSnafu, RenderError};
use crate::html::{escape_attr, escape_text};
use crate::types::{AnimationControls, Block};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

pub type SharedEngine = Arc<dyn RenderEngine>;

/// A loaded renderer producing embeddable markup for one block.
pub trait RenderEngine: Send + Sync {
    fn name(&self) -> &'static str;
    fn render<'a>(&'a self, block: &'a Block) -> BoxFuture<'a, Result<String, RenderError>>;
}

pub trait EngineLoader: Send + Sync {
    fn name(&self) -> &'static str;
    fn ensure_loaded(&self) -> BoxFuture<'_, Result<SharedEngine, RenderError>>;
}

struct Registration {
    loader: Arc<dyn EngineLoader>,
    engine: Arc<OnceCell<SharedEngine>>,
}

#[derive(Default)]
pub struct EngineCache {
    by_kind: HashMap<&'static str, Registration>,
    by_engine: HashMap<&'static str, Arc<OnceCell<SharedEngine>>>,
}

static ENGINE_CACHE: OnceLock<Arc<EngineCache>> = OnceLock::new();

impl EngineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut cache = Self::new();
        cache.register("chart", Arc::new(BuiltinLoader::VegaLite));
        cache.register("diagram", Arc::new(BuiltinLoader::Mermaid));
        cache.register("animation", Arc::new(BuiltinLoader::Lottie));
        cache
    }

    /// Process-wide cache holding the built-in engines.
    pub fn global() -> Arc<EngineCache> {
        ENGINE_CACHE
            .get_or_init(|| Arc::new(EngineCache::with_builtins()))
            .clone()
    }

    /// Register `loader` for a block kind. Kinds served by the same engine
    /// name share one loaded instance.
    pub fn register(&mut self, kind: &'static str, loader: Arc<dyn EngineLoader>) {
        let engine = self.by_engine.entry(loader.name()).or_default().clone();
        self.by_kind.insert(kind, Registration { loader, engine });
    }

    pub fn handles(&self, kind: &str) -> bool {
        self.by_kind.contains_key(kind)
    }

    pub fn is_loaded(&self, engine_name: &str) -> bool {
        self.by_engine
            .get(engine_name)
            .is_some_and(|cell| cell.initialized())
    }

    pub async fn engine_for(&self, kind: &str) -> Result<SharedEngine, RenderError> {
        let Some(registration) = self.by_kind.get(kind) else {
            return EngineUnavailableSnafu {
                kind,
                reason: "no engine registered",
            }
            .fail();
        };
        let engine = registration
            .engine
            .get_or_try_init(|| async {
                tracing::debug!(engine = registration.loader.name(), "loading rendering engine");
                registration.loader.ensure_loaded().await
            })
            .await?;
        Ok(engine.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum BuiltinLoader {
    VegaLite,
    Mermaid,
    Lottie,
}

impl EngineLoader for BuiltinLoader {
    fn name(&self) -> &'static str {
        match self {
            BuiltinLoader::VegaLite => "vega-lite",
            BuiltinLoader::Mermaid => "mermaid",
            BuiltinLoader::Lottie => "lottie",
        }
    }

    fn ensure_loaded(&self) -> BoxFuture<'_, Result<SharedEngine, RenderError>> {
        let engine: SharedEngine = match self {
            BuiltinLoader::VegaLite => Arc::new(VegaLiteEngine),
            BuiltinLoader::Mermaid => Arc::new(MermaidEngine),
            BuiltinLoader::Lottie => Arc::new(LottieEngine),
        };
        Box::pin(async move { Ok(engine) })
    }
}

struct VegaLiteEngine;

impl RenderEngine for VegaLiteEngine {
    fn name(&self) -> &'static str {
        "vega-lite"
    }

    fn render<'a>(&'a self, block: &'a Block) -> BoxFuture<'a, Result<String, RenderError>> {
        Box::pin(async move {
            let Block::Chart { spec, .. } = block else {
                return mismatched("chart", block);
            };
            let Some(map) = spec.as_object() else {
                return InvalidSpecSnafu {
                    kind: "chart",
                    reason: "spec must be an object",
                }
                .fail();
            };
            let mark = match map.get("mark") {
                Some(Value::String(mark)) => mark.as_str(),
                Some(Value::Object(mark)) => mark.get("type").and_then(Value::as_str).unwrap_or("mark"),
                _ if map.contains_key("layer") => "layered",
                _ => "chart",
            };
            let values = map
                .get("data")
                .and_then(|data| data.get("values"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            Ok(format!(
                "<div class=\"block chart vega\" data-engine=\"vega-lite\" data-spec=\"{}\">[{} chart, {} values]</div>",
                escape_attr(&spec.to_string()),
                escape_text(mark),
                values
            ))
        })
    }
}

const DIAGRAM_KEYWORDS: &[&str] = &[
    "flowchart",
    "graph",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
    "mindmap",
    "timeline",
    "gitGraph",
    "quadrantChart",
    "requirementDiagram",
    "C4Context",
    "xychart-beta",
    "sankey-beta",
    "block-beta",
];

struct MermaidEngine;

impl RenderEngine for MermaidEngine {
    fn name(&self) -> &'static str {
        "mermaid"
    }

    fn render<'a>(&'a self, block: &'a Block) -> BoxFuture<'a, Result<String, RenderError>> {
        Box::pin(async move {
            let Block::Diagram { code } = block else {
                return mismatched("diagram", block);
            };
            let source = code
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty() && !line.starts_with("%%"))
                .unwrap_or_default();
            let keyword = source
                .split(|c: char| c.is_whitespace() || c == ';')
                .next()
                .unwrap_or_default();
            if !DIAGRAM_KEYWORDS.contains(&keyword) {
                return InvalidSpecSnafu {
                    kind: "diagram",
                    reason: format!("unknown diagram type '{keyword}'"),
                }
                .fail();
            }
            Ok(format!(
                "<div class=\"block diagram mermaid\" data-engine=\"mermaid\"><pre class=\"mermaid\">{}</pre></div>",
                escape_text(code.trim())
            ))
        })
    }
}

struct LottieEngine;

impl RenderEngine for LottieEngine {
    fn name(&self) -> &'static str {
        "lottie"
    }

    fn render<'a>(&'a self, block: &'a Block) -> BoxFuture<'a, Result<String, RenderError>> {
        Box::pin(async move {
            let Block::Animation { json, controls, .. } = block else {
                return mismatched("animation", block);
            };
            let Some(layers) = json.get("layers").and_then(Value::as_array) else {
                return InvalidSpecSnafu {
                    kind: "animation",
                    reason: "animation has no layers",
                }
                .fail();
            };
            let controls = controls.clone().unwrap_or_default();
            let AnimationControls {
                r#loop,
                autoplay,
                speed,
            } = controls;
            let label = json
                .get("nm")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .unwrap_or("animation");
            Ok(format!(
                "<div class=\"block animation lottie\" data-engine=\"lottie\" data-loop=\"{}\" \
                 data-autoplay=\"{}\" data-speed=\"{}\" data-animation=\"{}\">[{}, {} layers]</div>",
                r#loop.unwrap_or(true),
                autoplay.unwrap_or(true),
                speed.unwrap_or(1.0),
                escape_attr(&json.to_string()),
                escape_text(label),
                layers.len()
            ))
        })
    }
}

fn mismatched<T>(expected: &'static str, block: &Block) -> Result<T, RenderError> {
    InvalidSpecSnafu {
        kind: expected,
        reason: format!("got a {} block", block.kind()),
    }
    .fail()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        fail: bool,
    }

    struct EchoEngine;

    impl RenderEngine for EchoEngine {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn render<'a>(&'a self, block: &'a Block) -> BoxFuture<'a, Result<String, RenderError>> {
            Box::pin(async move { Ok(format!("<echo>{}</echo>", block.kind())) })
        }
    }

    impl EngineLoader for CountingLoader {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn ensure_loaded(&self) -> BoxFuture<'_, Result<SharedEngine, RenderError>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    return EngineUnavailableSnafu {
                        kind: "diagram",
                        reason: "offline",
                    }
                    .fail();
                }
                let engine: SharedEngine = Arc::new(EchoEngine);
                Ok(engine)
            })
        }
    }

    #[tokio::test]
    async fn test_engine_is_loaded_once_and_shared_across_kinds() {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut cache = EngineCache::new();
        for kind in ["diagram", "animation"] {
            cache.register(
                kind,
                Arc::new(CountingLoader {
                    loads: loads.clone(),
                    fail: false,
                }),
            );
        }

        assert!(!cache.is_loaded("echo"));
        for kind in ["diagram", "animation", "diagram"] {
            cache.engine_for(kind).await.unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded("echo"));
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut cache = EngineCache::new();
        cache.register(
            "diagram",
            Arc::new(CountingLoader {
                loads: loads.clone(),
                fail: true,
            }),
        );
        assert!(cache.engine_for("diagram").await.is_err());
        assert!(cache.engine_for("diagram").await.is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_unavailable() {
        let error = EngineCache::new().engine_for("chart").await.err().unwrap();
        assert!(matches!(error, RenderError::EngineUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_global_cache_is_shared() {
        assert!(Arc::ptr_eq(&EngineCache::global(), &EngineCache::global()));
        assert!(EngineCache::global().handles("diagram"));
    }

    #[tokio::test]
    async fn test_mermaid_validates_diagram_keyword() {
        let engine = MermaidEngine;
        let ok = engine
            .render(&Block::Diagram {
                code: "%% title\nsequenceDiagram\nA->>B: hi".to_string(),
            })
            .await
            .unwrap();
        assert!(ok.contains("A-&gt;&gt;B: hi"));

        let error = engine
            .render(&Block::Diagram {
                code: "not a diagram".to_string(),
            })
            .await
            .unwrap_err();
        assert!(error.to_string().contains("unknown diagram type 'not'"));
    }

    #[tokio::test]
    async fn test_lottie_requires_layers() {
        let engine = LottieEngine;
        let block = Block::Animation {
            json: json!({"nm": "spin", "layers": [{}, {}]}),
            data: None,
            controls: None,
            title: None,
        };
        let html = engine.render(&block).await.unwrap();
        assert!(html.contains("data-loop=\"true\""));
        assert!(html.contains("[spin, 2 layers]"));

        let bad = Block::Animation {
            json: json!({}),
            data: None,
            controls: None,
            title: None,
        };
        assert!(engine.render(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_vega_lite_summarizes_mark_and_values() {
        let block = Block::Chart {
            spec: json!({"mark": {"type": "bar"}, "data": {"values": [1, 2, 3]}}),
            title: None,
        };
        let html = VegaLiteEngine.render(&block).await.unwrap();
        assert!(html.contains("[bar chart, 3 values]"));
        assert!(html.contains("data-spec=\"{&quot;data&quot;"));
    }
}
