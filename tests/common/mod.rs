//! Deterministic collaborators for pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use folio::cache::ClassificationCache;
use folio::classify::SemanticModel;
use folio::extract::{DocumentParser, OcrEngine};
use folio::remote::{RemoteClassifier, RemoteError, RemoteGateway, RemoteVerdict, RetryPolicy};
use folio::{CategorySet, Orchestrator, OrchestratorOptions};

const VOCABULARY: &[&str] = &[
    "blood", "doctor", "exam", "bank", "invoice", "payment", "contract", "court", "beach",
    "vacation", "photo",
];

/// Counts vocabulary words; every vector also carries a small constant so
/// texts without known words still embed to a non-zero vector.
#[derive(Default)]
pub struct BagOfWords {
    pub calls: AtomicUsize,
}

impl BagOfWords {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SemanticModel for BagOfWords {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut vector: Vec<f32> = VOCABULARY
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .collect();
                vector.push(0.01);
                vector
            })
            .collect())
    }
}

pub fn categories() -> CategorySet {
    CategorySet::from_pairs([
        ("Health", "blood exam results and doctor visits"),
        ("Financial", "bank statements, invoice and payment receipts"),
        ("Legal", "contract and court documents"),
        ("Images", "photo files"),
        ("Other", "beach vacation and everything else"),
    ])
    .unwrap()
}

/// What the scripted remote was asked
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    File { mime_type: String },
    Text { text: String },
}

type Responder = dyn Fn(&RemoteCall) -> Result<RemoteVerdict, RemoteError> + Send + Sync;

/// Remote classifier answering through a closure
pub struct ScriptedRemote {
    responder: Box<Responder>,
    pub calls: Mutex<Vec<RemoteCall>>,
}

impl ScriptedRemote {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&RemoteCall) -> Result<RemoteVerdict, RemoteError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Always answers with `category`
    pub fn answering(category: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(verdict(category)))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, call: RemoteCall) -> Result<RemoteVerdict, RemoteError> {
        let result = (self.responder)(&call);
        self.calls.lock().unwrap().push(call);
        result
    }
}

pub fn verdict(category: &str) -> RemoteVerdict {
    RemoteVerdict {
        category: Some(category.to_string()),
        confidence: Some(0.9),
        error: None,
    }
}

#[async_trait]
impl RemoteClassifier for ScriptedRemote {
    async fn classify_file(
        &self,
        _file_data: &[u8],
        mime_type: &str,
        _categories: &CategorySet,
    ) -> Result<RemoteVerdict, RemoteError> {
        self.answer(RemoteCall::File {
            mime_type: mime_type.to_string(),
        })
    }

    async fn classify_text(
        &self,
        text: &str,
        _categories: &CategorySet,
    ) -> Result<RemoteVerdict, RemoteError> {
        self.answer(RemoteCall::Text {
            text: text.to_string(),
        })
    }

    async fn describe_category(&self, name: &str) -> Result<String, RemoteError> {
        Ok(format!("Documents about {}", name.to_lowercase()))
    }
}

/// OCR that only "reads" files whose name contains "beach"
pub struct BeachOcr;

impl OcrEngine for BeachOcr {
    fn recognize_image(&self, path: &Path) -> Result<String, String> {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        if name.contains("beach") {
            Ok("sunny beach vacation with friends".to_string())
        } else {
            Err("no text found".to_string())
        }
    }

    fn recognize_pdf(&self, _path: &Path) -> Result<String, String> {
        Err("no text found".to_string())
    }
}

pub struct Harness {
    pub model: Arc<BagOfWords>,
    pub remote: Option<Arc<ScriptedRemote>>,
    pub orchestrator: Orchestrator,
}

pub fn harness(data_dir: &Path, remote: Option<Arc<ScriptedRemote>>) -> Harness {
    harness_with(data_dir, remote, OrchestratorOptions::default(), DocumentParser::new())
}

pub fn harness_with(
    data_dir: &Path,
    remote: Option<Arc<ScriptedRemote>>,
    options: OrchestratorOptions,
    parser: DocumentParser,
) -> Harness {
    let model = Arc::new(BagOfWords::default());
    let mut orchestrator = Orchestrator::new(
        model.clone(),
        Arc::new(parser),
        ClassificationCache::new(data_dir),
    )
    .with_options(options);

    if let Some(remote) = &remote {
        orchestrator = orchestrator.with_remote(RemoteGateway::new(
            remote.clone(),
            RetryPolicy::new(3, Duration::from_millis(1)),
            0.3,
        ));
    }

    Harness {
        model,
        remote,
        orchestrator,
    }
}

pub fn write(dir: &Path, name: &str, content: &[u8]) {
    std::fs::write(dir.join(name), content).unwrap();
}
