use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::*;
use crossbeam::channel::{unbounded, Receiver, Sender};

/// Decodes raw file bytes into an asset
pub type DecodeFn<T> = fn(&[u8]) -> Result<T>;

#[derive(Debug, Clone)]
pub enum AssetState<T> {
    Pending,
    Ready(Arc<T>),
    Failed,
}

/// Completion signal for one named asset. Each requested asset produces exactly one event.
#[derive(Debug, Clone)]
pub enum AssetEvent<T> {
    Loaded(String, Arc<T>),
    Failed(String),
}

/// One-shot asynchronous asset loading. Files are read and decoded on a loader thread, results are
/// handed back to the frame loop through `poll`, which never blocks.
pub struct AssetLoader<T: Send + Sync + 'static> {
    decode: DecodeFn<T>,
    states: BTreeMap<String, AssetState<T>>,
    sender: Sender<(String, Result<T>)>,
    receiver: Receiver<(String, Result<T>)>,
}

impl<T: Send + Sync + 'static> AssetLoader<T> {
    pub fn new(decode: DecodeFn<T>) -> AssetLoader<T> {
        let (sender, receiver) = unbounded();
        AssetLoader {
            decode,
            states: BTreeMap::new(),
            sender,
            receiver,
        }
    }

    /// Starts loading `path` under `name`. Requesting a name twice does nothing.
    pub fn request(&mut self, name: &str, path: impl Into<PathBuf>) {
        if self.states.contains_key(name) {
            return;
        }
        let path = path.into();
        let name = name.to_string();
        let decode = self.decode;
        let sender = self.sender.clone();
        debug!("Requesting asset {} from {}", name, path.display());
        self.states.insert(name.clone(), AssetState::Pending);
        let spawned = thread::Builder::new()
            .name(format!("asset-{}", name))
            .spawn({
                let name = name.clone();
                move || {
                    let result = fs::read(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))
                        .and_then(|bytes| decode(&bytes));
                    // Receiver gone means the loader was dropped, nobody waits for this result
                    let _ = sender.send((name, result));
                }
            });
        if let Err(e) = spawned {
            error!("Failed to start loading asset {}: {}", name, e);
            self.states.insert(name, AssetState::Failed);
        }
    }

    /// Inserts an already decoded asset, e.g. one generated in code
    pub fn insert(&mut self, name: &str, asset: T) -> Arc<T> {
        let asset = Arc::new(asset);
        self.states
            .insert(name.to_string(), AssetState::Ready(asset.clone()));
        asset
    }

    /// Drains finished loads. Failures are logged here once.
    pub fn poll(&mut self) -> Vec<AssetEvent<T>> {
        let mut events = vec![];
        while let std::result::Result::Ok((name, result)) = self.receiver.try_recv() {
            events.push(self.finish(name, result));
        }
        events
    }

    /// Blocks until nothing is pending or `timeout` elapses, returning the finished loads
    pub fn wait_all(&mut self, timeout: Duration) -> Vec<AssetEvent<T>> {
        let deadline = Instant::now() + timeout;
        let mut events = vec![];
        while self.num_pending() > 0 {
            let now = Instant::now();
            if now >= deadline {
                warn!("{} assets still pending after {:?}", self.num_pending(), timeout);
                break;
            }
            match self.receiver.recv_timeout(deadline - now) {
                std::result::Result::Ok((name, result)) => events.push(self.finish(name, result)),
                Err(_) => continue,
            }
        }
        events
    }

    fn finish(&mut self, name: String, result: Result<T>) -> AssetEvent<T> {
        match result {
            std::result::Result::Ok(asset) => {
                info!("Loaded asset {}", name);
                let asset = Arc::new(asset);
                self.states
                    .insert(name.clone(), AssetState::Ready(asset.clone()));
                AssetEvent::Loaded(name, asset)
            }
            Err(e) => {
                error!("Failed to load asset {}: {:#}", name, e);
                self.states.insert(name.clone(), AssetState::Failed);
                AssetEvent::Failed(name)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        match self.states.get(name) {
            Some(AssetState::Ready(asset)) => Some(asset.clone()),
            _ => None,
        }
    }

    pub fn state(&self, name: &str) -> Option<&AssetState<T>> {
        self.states.get(name)
    }

    pub fn is_requested(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn num_pending(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, AssetState::Pending))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::env::temp_dir;

    use super::*;

    fn decode_text(bytes: &[u8]) -> Result<String> {
        let text = String::from_utf8(bytes.to_vec())?;
        if text.is_empty() {
            bail!("Empty asset");
        }
        std::result::Result::Ok(text)
    }

    #[test]
    fn test_load_and_fail() {
        let dir = temp_dir().join(format!("toybox_assets_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("good.txt"), "hello").unwrap();
        fs::write(dir.join("empty.txt"), "").unwrap();

        let mut loader = AssetLoader::new(decode_text);
        loader.request("good", dir.join("good.txt"));
        loader.request("empty", dir.join("empty.txt"));
        loader.request("missing", dir.join("missing.txt"));
        // Second request is ignored
        loader.request("good", dir.join("missing.txt"));
        assert_eq!(loader.num_pending(), 3);

        let events = loader.wait_all(Duration::from_secs(10));
        assert_eq!(events.len(), 3);
        assert_eq!(loader.num_pending(), 0);
        assert_eq!(loader.get("good").as_deref().map(|s| s.as_str()), Some("hello"));
        assert!(matches!(loader.state("empty"), Some(AssetState::Failed)));
        assert!(matches!(loader.state("missing"), Some(AssetState::Failed)));
        assert!(loader.poll().is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_insert_is_ready() {
        let mut loader = AssetLoader::new(decode_text);
        loader.insert("generated", "text".to_string());
        assert!(loader.is_requested("generated"));
        assert_eq!(loader.num_pending(), 0);
        assert!(loader.get("generated").is_some());
    }
}
