//! Sound cues and the lazily-loaded sound registry.
//!
//! The engine only decides *that* a cue should play; decoding and playback
//! belong to the embedding application, which subscribes to the cue
//! broadcast and pulls the bytes it needs from a [`SoundLibrary`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

/// Join and leave cues stay quiet in calls larger than this.
pub const SOUND_CUE_PARTICIPANT_LIMIT: usize = 8;

/// A discrete audio event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundCue {
    Join,
    Left,
    RaiseHand,
    /// A reaction appeared; `name` is the catalog name, or the generic name
    /// for reactions without a dedicated sound.
    Reaction { name: String },
}

/// Registry of decoded sound data, keyed by cue name.
///
/// Owned by the embedding application rather than living in a global.
/// Each sound loads at most once: concurrent callers for the same name
/// share one cell, and whoever initializes it first wins.
#[derive(Debug, Default)]
pub struct SoundLibrary {
    sounds: Mutex<HashMap<String, Arc<OnceCell<Arc<[u8]>>>>>,
}

impl SoundLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a sound, running `loader` only if nobody has loaded this name
    /// before.
    pub fn get_or_load<F>(&self, name: &str, loader: F) -> Arc<[u8]>
    where
        F: FnOnce() -> Vec<u8>,
    {
        let cell = {
            let mut sounds = self.lock();
            sounds.entry(name.to_string()).or_default().clone()
        };
        cell.get_or_init(|| Arc::from(loader())).clone()
    }

    /// A previously loaded sound, if any.
    pub fn get(&self, name: &str) -> Option<Arc<[u8]>> {
        let sounds = self.lock();
        sounds.get(name).and_then(|cell| cell.get()).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<OnceCell<Arc<[u8]>>>>> {
        match self.sounds.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn loader_runs_once_per_name() {
        let library = SoundLibrary::new();
        let loads = AtomicUsize::new(0);

        let first = library.get_or_load("join", || {
            loads.fetch_add(1, Ordering::SeqCst);
            vec![1, 2, 3]
        });
        let second = library.get_or_load("join", || {
            loads.fetch_add(1, Ordering::SeqCst);
            vec![9, 9, 9]
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(&*first, &[1, 2, 3]);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn names_load_independently() {
        let library = SoundLibrary::new();
        library.get_or_load("join", || vec![1]);
        library.get_or_load("left", || vec![2]);
        assert_eq!(&*library.get("join").unwrap(), &[1]);
        assert_eq!(&*library.get("left").unwrap(), &[2]);
        assert!(library.get("raise-hand").is_none());
    }

    #[test]
    fn concurrent_loads_share_one_result() {
        let library = Arc::new(SoundLibrary::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let library = Arc::clone(&library);
                let loads = Arc::clone(&loads);
                std::thread::spawn(move || {
                    library.get_or_load("reaction", move || {
                        loads.fetch_add(1, Ordering::SeqCst);
                        vec![i]
                    })
                })
            })
            .collect();

        let results: Vec<Arc<[u8]>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
