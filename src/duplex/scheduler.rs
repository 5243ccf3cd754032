//! Gapless scheduling of streamed response audio

use std::collections::HashSet;

use crate::audio::{AudioBuffer, OutputSink, SourceId};

/// Where a buffer was placed on the output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub id: SourceId,
    /// Output-clock time in seconds
    pub start_at: f64,
}

/// Places each buffer right after the previous one on the sink's clock
///
/// A buffer arriving after the timeline has drained starts immediately
/// instead of in the past.
pub struct PlaybackScheduler {
    sink: Box<dyn OutputSink>,
    cursor: f64,
    next_id: SourceId,
    active: HashSet<SourceId>,
}

impl PlaybackScheduler {
    #[must_use]
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            cursor: 0.0,
            next_id: 1,
            active: HashSet::new(),
        }
    }

    /// Start `buffer` at `max(now, cursor)` and advance the cursor past it
    pub fn schedule(&mut self, buffer: &AudioBuffer) -> Scheduled {
        let start_at = self.sink.now().max(self.cursor);
        let id = self.next_id;
        self.next_id += 1;

        self.sink.start(id, buffer, start_at);
        self.cursor = start_at + buffer.duration();
        self.active.insert(id);

        tracing::trace!(id, start_at, cursor = self.cursor, "buffer scheduled");
        Scheduled { id, start_at }
    }

    /// Forget a source that finished playing
    pub fn finish(&mut self, id: SourceId) {
        self.active.remove(&id);
    }

    /// Stop every tracked source
    pub fn stop_all(&mut self) {
        for id in self.active.drain() {
            self.sink.stop(id);
        }
    }

    /// Zero the playback cursor
    pub const fn reset(&mut self) {
        self.cursor = 0.0;
    }

    /// Stop everything, release the device and reset the cursor
    pub fn close(&mut self) {
        self.stop_all();
        self.sink.close();
        self.reset();
    }

    /// End of the scheduled timeline
    #[must_use]
    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Sources started and not yet finished or stopped
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Log {
        now: f64,
        started: Vec<(SourceId, f64)>,
        stopped: Vec<SourceId>,
        closed: bool,
    }

    struct FakeSink(Arc<Mutex<Log>>);

    impl OutputSink for FakeSink {
        fn now(&self) -> f64 {
            self.0.lock().unwrap().now
        }

        fn start(&mut self, id: SourceId, _buffer: &AudioBuffer, at: f64) {
            self.0.lock().unwrap().started.push((id, at));
        }

        fn stop(&mut self, id: SourceId) {
            self.0.lock().unwrap().stopped.push(id);
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closed = true;
        }
    }

    fn seconds(duration: f64) -> AudioBuffer {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let len = (duration * 1000.0) as usize;
        AudioBuffer {
            samples: vec![0.0; len],
            sample_rate: 1000,
            channels: 1,
        }
    }

    fn scheduler(now: f64) -> (PlaybackScheduler, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log {
            now,
            ..Log::default()
        }));
        (PlaybackScheduler::new(Box::new(FakeSink(Arc::clone(&log)))), log)
    }

    #[test]
    fn buffers_play_back_to_back() {
        let (mut scheduler, _log) = scheduler(2.0);

        let a = scheduler.schedule(&seconds(0.5));
        let b = scheduler.schedule(&seconds(1.25));
        let c = scheduler.schedule(&seconds(0.25));

        assert!((a.start_at - 2.0).abs() < 1e-9);
        assert!((b.start_at - 2.5).abs() < 1e-9);
        assert!((c.start_at - 3.75).abs() < 1e-9);
        assert!((scheduler.cursor() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn timely_arrivals_queue_while_clock_advances() {
        let (mut scheduler, log) = scheduler(1.0);
        let a = scheduler.schedule(&seconds(0.5));

        log.lock().unwrap().now = 1.2;
        let b = scheduler.schedule(&seconds(0.3));

        log.lock().unwrap().now = 1.4;
        let c = scheduler.schedule(&seconds(0.1));

        assert!((a.start_at - 1.0).abs() < 1e-9);
        assert!((b.start_at - 1.5).abs() < 1e-9);
        assert!((c.start_at - 1.8).abs() < 1e-9);
        assert!((scheduler.cursor() - 1.9).abs() < 1e-9);

        let started: Vec<f64> = log.lock().unwrap().started.iter().map(|s| s.1).collect();
        assert_eq!(started, vec![a.start_at, b.start_at, c.start_at]);
    }

    #[test]
    fn late_buffer_starts_now() {
        let (mut scheduler, log) = scheduler(0.0);
        scheduler.schedule(&seconds(0.5));

        log.lock().unwrap().now = 3.0;
        let late = scheduler.schedule(&seconds(0.5));
        assert!((late.start_at - 3.0).abs() < 1e-9);
    }

    #[test]
    fn stop_all_stops_only_unfinished_sources() {
        let (mut scheduler, log) = scheduler(0.0);
        let a = scheduler.schedule(&seconds(0.5));
        let b = scheduler.schedule(&seconds(0.5));
        scheduler.finish(a.id);

        scheduler.stop_all();
        assert_eq!(log.lock().unwrap().stopped, vec![b.id]);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn close_releases_sink_and_resets_cursor() {
        let (mut scheduler, log) = scheduler(0.0);
        scheduler.schedule(&seconds(1.0));

        scheduler.close();
        let log = log.lock().unwrap();
        assert!(log.closed);
        assert_eq!(log.stopped.len(), 1);
        assert!(scheduler.cursor().abs() < f64::EPSILON);
    }
}
