//! Shared helpers for kismet-core integration tests: scripted text and image
//! generators and throwaway storage.

#![allow(unused_imports, dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kismet_core::error::{KismetError, Result};
use kismet_core::files::FileStore;
use kismet_core::imagegen::ImageGenerator;
use kismet_core::llm::TextGenerator;
use kismet_core::state::UiState;
use kismet_core::storage::SqliteStorage;
use tokio::sync::{watch, Notify};

pub const STORY: &str = "STORY_TITLE: The Lantern\n\
TEXT_CONTENT: A keeper climbs the tower.\n\
IMAGE_PROMPT: A lighthouse at dusk, oil painting\n\
TEXT_CONTENT: The light comes on.\n";

pub const RECIPE: &str = r#"Here you go:
{"recipeTitle": "Lemon Rice", "description": "Bright and quick.", "yield": "2 servings",
 "prepTime": "5 minutes", "cookTime": "15 minutes", "imagePrompt": "A bowl of lemon rice",
 "ingredients": ["1 cup rice", "1 lemon"], "instructions": ["Cook the rice.", "Add lemon."]}"#;

pub const PROBLEM: &str = "### Problem: Two Sum\n\n**Description:**\n\nFind two numbers that add up to a target.";

pub fn temp_root() -> PathBuf {
    std::env::temp_dir().join(format!("kismet-test-{}", uuid::Uuid::now_v7()))
}

pub struct TestEnv {
    pub root: PathBuf,
    pub storage: SqliteStorage,
    pub files: FileStore,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = temp_root();
        let storage = SqliteStorage::open(root.join("kismet.db")).expect("open storage");
        let files = FileStore::new(&root);
        Self {
            root,
            storage,
            files,
        }
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// Text generator that replays scripted replies. The last reply repeats.
#[derive(Clone, Default)]
pub struct MockText {
    replies: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Notify>>,
    call_gates: Arc<Vec<Arc<Notify>>>,
}

impl MockText {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Arc::new(Mutex::new(
                replies.iter().map(|r| Ok(r.to_string())).collect(),
            )),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from([Err(message.to_string())]))),
            ..Default::default()
        }
    }

    /// Call `n` waits on `gates[n]` and then answers with `replies[n]`, so
    /// overlapping calls can be completed in any order.
    pub fn per_call(replies: &[&str], gates: &[Arc<Notify>]) -> Self {
        Self {
            call_gates: Arc::new(gates.to_vec()),
            ..Self::replying(replies)
        }
    }

    /// Each call waits for one `notify_one` on `gate` before replying.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl TextGenerator for MockText {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(gate) = self.call_gates.get(call) {
            gate.notified().await;
        } else if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if !self.call_gates.is_empty() {
                replies.get(call).cloned()
            } else if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(KismetError::ExternalService(message)),
            None => Ok(String::new()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageReply {
    Bytes,
    Nothing,
    Fail,
}

/// Image generator with a fixed outcome and a call counter.
#[derive(Clone)]
pub struct MockImages {
    reply: ImageReply,
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Notify>>,
}

impl MockImages {
    pub fn new(reply: ImageReply) -> Self {
        Self {
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageGenerator for MockImages {
    async fn generate_image(&self, _prompt: &str) -> Result<Option<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.reply {
            ImageReply::Bytes => Ok(Some(b"\x89PNG fake".to_vec())),
            ImageReply::Nothing => Ok(None),
            ImageReply::Fail => Err(KismetError::ExternalService("image quota exceeded".into())),
        }
    }
}

/// Wait (bounded) until the screen state satisfies `f`.
pub async fn wait_for_state(rx: &mut watch::Receiver<UiState>, f: impl FnMut(&UiState) -> bool) -> UiState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed")
        .clone()
}
