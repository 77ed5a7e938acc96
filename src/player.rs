//! Music queue. The index is `None` when nothing is selected and always
//! points at a real track otherwise.

use crate::api::{QueueSnapshot, Track};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerQueue {
    tracks: Vec<Track>,
    index: Option<usize>,
}

impl PlayerQueue {
    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let index = usize::try_from(snapshot.index)
            .ok()
            .filter(|i| *i < snapshot.tracks.len());
        Self {
            tracks: snapshot.tracks,
            index,
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.tracks.clone(),
            index: self.index.map_or(-1, |i| i as i64),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn current(&self) -> Option<&Track> {
        self.index.and_then(|i| self.tracks.get(i))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Append; starts playback when nothing was selected.
    pub fn enqueue(&mut self, track: Track) -> Option<&Track> {
        self.tracks.push(track);
        if self.index.is_none() {
            self.index = Some(self.tracks.len() - 1);
            return self.current();
        }
        None
    }

    /// Current track finished. Advances by one; at the end of the queue the
    /// index stays on the last track and nothing new starts.
    pub fn on_ended(&mut self) -> Option<&Track> {
        let next = match self.index {
            Some(i) => i + 1,
            None => 0,
        };
        if next >= self.tracks.len() {
            return None;
        }
        self.index = Some(next);
        self.current()
    }

    pub fn seek(&mut self, index: usize) -> Option<&Track> {
        if index >= self.tracks.len() {
            return None;
        }
        self.index = Some(index);
        self.current()
    }

    pub fn remove(&mut self, at: usize) -> Option<Track> {
        if at >= self.tracks.len() {
            return None;
        }
        let removed = self.tracks.remove(at);
        let len = self.tracks.len();
        self.index = match self.index {
            _ if len == 0 => None,
            Some(i) if at < i => Some(i - 1),
            Some(i) if i >= len => Some(len - 1),
            other => other,
        };
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.index = None;
    }
}
