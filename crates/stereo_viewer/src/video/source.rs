use super::{
    audio::{convert, AudioOutput},
    AudioChunk, LatestFrame, SampleReader, VideoImage, VideoSample,
};
use crate::error::{AudioError, MediaError};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

/// Decoded frames buffered between the decode thread and the render thread.
pub const VIDEO_QUEUE_DEPTH: usize = 4;
/// Decoded audio chunks buffered ahead of scheduling.
pub const AUDIO_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced,
    /// The decoder has not produced the next frame yet.
    NotReady,
    Ended,
}

pub type FrameCallback = Box<dyn FnMut(VideoImage) + Send>;

/// Runs `reader` on its own thread until end of stream, a decode error, or
/// the receiver going away.
pub fn spawn_decoder<R>(name: &str, mut reader: R, capacity: usize) -> Result<(Receiver<R::Sample>, JoinHandle<()>), MediaError>
where
    R: SampleReader + 'static,
{
    let (tx, rx) = bounded(capacity.max(1));
    let label = name.to_string();
    let handle = thread::Builder::new().name(label.clone()).spawn(move || loop {
        match reader.copy_next_sample() {
            Ok(Some(sample)) => {
                if tx.send(sample).is_err() {
                    log::debug!("{label}: consumer gone, stopping");
                    break;
                }
            }
            Ok(None) => {
                log::debug!("{label}: end of stream");
                break;
            }
            Err(e) => {
                log::error!("{label}: decode failed: {e}");
                break;
            }
        }
    })?;
    Ok((rx, handle))
}

struct AudioPath {
    rx: Receiver<AudioChunk>,
    output: Box<dyn AudioOutput>,
    /// Source timestamp up to which audio has been scheduled.
    scheduled_until: f64,
    lead: f64,
    ended: bool,
}

/// Pull-based access to decoded video frames (and optional audio).
///
/// [`VideoFrameSource::advance_frame`] only moves the pending frame forward;
/// the visible texture changes in [`VideoFrameSource::deliver_pending_frame`].
pub struct VideoFrameSource {
    video_rx: Receiver<VideoSample>,
    pending: LatestFrame<VideoSample>,
    callback: Option<FrameCallback>,
    audio: Option<AudioPath>,
    interval: f64,
    latest_pts: Option<f64>,
    ended: bool,
    threads: Vec<JoinHandle<()>>,
}

impl VideoFrameSource {
    pub fn new<R>(reader: R, frame_interval: f64) -> Result<Self, MediaError>
    where
        R: SampleReader<Sample = VideoSample> + 'static,
    {
        let (video_rx, handle) = spawn_decoder("video-decode", reader, VIDEO_QUEUE_DEPTH)?;
        Ok(Self {
            video_rx,
            pending: LatestFrame::new(),
            callback: None,
            audio: None,
            interval: frame_interval,
            latest_pts: None,
            ended: false,
            threads: vec![handle],
        })
    }

    /// Starts `output` and decodes the audio track for it. A failed start is
    /// fatal for the session.
    pub fn with_audio<R>(mut self, reader: R, mut output: Box<dyn AudioOutput>, lead: f64) -> Result<Self, AudioError>
    where
        R: SampleReader<Sample = AudioChunk> + 'static,
    {
        output.start()?;
        let (rx, handle) = spawn_decoder("audio-decode", reader, AUDIO_QUEUE_DEPTH)
            .map_err(|e| AudioError::Start(e.to_string()))?;
        self.threads.push(handle);
        self.audio = Some(AudioPath {
            rx,
            output,
            scheduled_until: 0.0,
            lead: lead.max(0.0),
            ended: false,
        });
        Ok(self)
    }

    pub fn set_frame_callback(&mut self, callback: impl FnMut(VideoImage) + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Takes the next decoded frame, if any, and makes it pending.
    pub fn advance_frame(&mut self) -> AdvanceOutcome {
        if self.ended {
            return AdvanceOutcome::Ended;
        }
        match self.video_rx.try_recv() {
            Ok(sample) => {
                self.latest_pts = Some(sample.pts);
                if self.pending.publish(sample) {
                    log::trace!("Dropped an undelivered video frame");
                }
                AdvanceOutcome::Advanced
            }
            Err(TryRecvError::Empty) => AdvanceOutcome::NotReady,
            Err(TryRecvError::Disconnected) => {
                self.ended = true;
                log::info!("Video stream ended at {:.3}s", self.latest_pts.unwrap_or(0.0));
                AdvanceOutcome::Ended
            }
        }
    }

    /// Hands the pending frame to the callback. Returns whether one was
    /// delivered.
    pub fn deliver_pending_frame(&mut self) -> bool {
        let Some(sample) = self.pending.take() else {
            return false;
        };
        match VideoImage::from_sample(sample) {
            Ok(image) => match self.callback.as_mut() {
                Some(callback) => {
                    callback(image);
                    true
                }
                None => false,
            },
            Err(e) => {
                log::warn!("Skipping video frame: {e}");
                false
            }
        }
    }

    /// Schedules decoded audio until it runs `lead` seconds ahead of the
    /// newest advanced video frame.
    pub fn pump_audio(&mut self) -> usize {
        let Some(audio) = self.audio.as_mut() else {
            return 0;
        };
        if audio.ended {
            return 0;
        }
        let target = self.latest_pts.unwrap_or(0.0) + audio.lead;
        let mut scheduled = 0;
        while audio.scheduled_until < target {
            match audio.rx.try_recv() {
                Ok(chunk) => {
                    audio.scheduled_until = chunk.pts + chunk.duration();
                    let converted = convert(&chunk, audio.output.format());
                    audio.output.schedule(converted);
                    scheduled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    audio.ended = true;
                    log::info!("Audio stream ended at {:.3}s", audio.scheduled_until);
                    break;
                }
            }
        }
        scheduled
    }

    #[inline]
    pub fn frame_interval(&self) -> f64 {
        self.interval
    }

    #[inline]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    #[inline]
    pub fn latest_pts(&self) -> Option<f64> {
        self.latest_pts
    }

    pub fn audio_scheduled_until(&self) -> Option<f64> {
        self.audio.as_ref().map(|a| a.scheduled_until)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_pending()
    }
}

impl Drop for VideoFrameSource {
    fn drop(&mut self) {
        // Disconnect the channels first so blocked decoders wake up and exit.
        let (_, rx) = bounded(0);
        self.video_rx = rx;
        self.audio = None;
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::audio::{AudioFormat, NullAudioOutput};
    use parking_lot::Mutex;
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    struct VecReader<T>(std::vec::IntoIter<T>);

    impl<T: Send> SampleReader for VecReader<T> {
        type Sample = T;

        fn copy_next_sample(&mut self) -> Result<Option<T>, MediaError> {
            Ok(self.0.next())
        }
    }

    struct FailingReader;

    impl SampleReader for FailingReader {
        type Sample = VideoSample;

        fn copy_next_sample(&mut self) -> Result<Option<VideoSample>, MediaError> {
            Err(MediaError::invalid("corrupt"))
        }
    }

    fn frames(n: usize) -> Vec<VideoSample> {
        (0..n)
            .map(|i| VideoSample {
                pts: i as f64 / 24.0,
                width: 1,
                height: 1,
                data: vec![i as u8; 4],
            })
            .collect()
    }

    fn advance_blocking(source: &mut VideoFrameSource) -> AdvanceOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match source.advance_frame() {
                AdvanceOutcome::NotReady if Instant::now() < deadline => thread::sleep(Duration::from_millis(1)),
                other => return other,
            }
        }
    }

    #[test]
    fn frames_are_delivered_through_callback() {
        let mut source = VideoFrameSource::new(VecReader(frames(3).into_iter()), 1.0 / 24.0).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        source.set_frame_callback(move |image| sink.lock().push(image.rgba[0]));

        assert!(!source.deliver_pending_frame());
        assert_eq!(advance_blocking(&mut source), AdvanceOutcome::Advanced);
        assert!(source.deliver_pending_frame());
        assert!(!source.deliver_pending_frame());
        assert_eq!(*seen.lock(), vec![0]);
    }

    #[test]
    fn pending_frame_is_replaced_not_queued() {
        let mut source = VideoFrameSource::new(VecReader(frames(3).into_iter()), 1.0 / 24.0).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        source.set_frame_callback(move |image| sink.lock().push(image.rgba[0]));

        assert_eq!(advance_blocking(&mut source), AdvanceOutcome::Advanced);
        assert_eq!(advance_blocking(&mut source), AdvanceOutcome::Advanced);
        assert!(source.deliver_pending_frame());
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn end_of_stream_is_sticky() {
        let mut source = VideoFrameSource::new(VecReader(frames(1).into_iter()), 1.0 / 24.0).unwrap();
        assert_eq!(advance_blocking(&mut source), AdvanceOutcome::Advanced);
        assert_eq!(advance_blocking(&mut source), AdvanceOutcome::Ended);
        assert_eq!(source.advance_frame(), AdvanceOutcome::Ended);
        assert!(source.is_ended());
    }

    #[test]
    fn decode_failure_stops_advancing() {
        let mut source = VideoFrameSource::new(FailingReader, 1.0 / 24.0).unwrap();
        assert_eq!(advance_blocking(&mut source), AdvanceOutcome::Ended);
    }

    #[test]
    fn audio_tops_up_to_video_plus_lead() {
        let chunks: Vec<AudioChunk> = (0..20)
            .map(|i| AudioChunk {
                pts: i as f64 * 0.05,
                sample_rate: 1000,
                channels: 1,
                samples: vec![0.0; 50],
            })
            .collect();
        let output = Box::new(NullAudioOutput::new(AudioFormat::default()));
        let mut source = VideoFrameSource::new(VecReader(frames(30).into_iter()), 1.0 / 24.0)
            .unwrap()
            .with_audio(VecReader(chunks.into_iter()), output, 0.1)
            .unwrap();

        // Let the audio decoder fill its queue.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut scheduled = 0;
        while source.audio_scheduled_until() < Some(0.1) && Instant::now() < deadline {
            scheduled += source.pump_audio();
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(scheduled, 2);
        let until = source.audio_scheduled_until().unwrap();
        assert!((until - 0.1).abs() < 1e-9);

        // Nothing more until video moves on.
        assert_eq!(source.pump_audio(), 0);
        for _ in 0..6 {
            advance_blocking(&mut source);
        }
        let target = source.latest_pts().unwrap() + 0.1;
        let deadline = Instant::now() + Duration::from_secs(5);
        while source.audio_scheduled_until().unwrap() < target && Instant::now() < deadline {
            source.pump_audio();
            thread::sleep(Duration::from_millis(1));
        }
        let until = source.audio_scheduled_until().unwrap();
        assert!(until >= target - 1e-9);
        // Never more than one chunk past the target.
        assert!(until < target + 0.05 + 1e-9);
    }

    #[test]
    fn failed_audio_start_is_an_error() {
        let output = Box::new(NullAudioOutput::new(AudioFormat {
            sample_rate: 0,
            channels: 0,
        }));
        let source = VideoFrameSource::new(VecReader(frames(1).into_iter()), 1.0 / 24.0).unwrap();
        let chunks: Vec<AudioChunk> = Vec::new();
        assert!(source.with_audio(VecReader(chunks.into_iter()), output, 0.1).is_err());
    }
}
