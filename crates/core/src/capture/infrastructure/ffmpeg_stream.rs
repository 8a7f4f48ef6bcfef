//! Live media stream decoded by ffmpeg-next on a background thread.
//!
//! The decode thread keeps only the most recent frame; the pipeline samples
//! it at its own rate. File sources are paced to their frame rate so they
//! behave like a live feed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::domain::media_stream::{CaptureError, MediaStream, StreamProvider};
use crate::messaging::domain::messages::StreamId;
use crate::shared::frame::Frame;

/// How long `acquire` waits for the source to open.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest single sleep while pacing, so stop requests are noticed quickly.
const PACING_SLICE: Duration = Duration::from_millis(50);

/// Opens stream ids as ffmpeg inputs (paths, `file://` URLs, device or
/// network URLs ffmpeg understands).
pub struct FfmpegStreamProvider {
    realtime: bool,
}

impl FfmpegStreamProvider {
    /// `realtime` paces decoding to the source frame rate.
    pub fn new(realtime: bool) -> Self {
        Self { realtime }
    }
}

impl Default for FfmpegStreamProvider {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StreamProvider for FfmpegStreamProvider {
    fn acquire(&mut self, stream_id: &StreamId) -> Result<Box<dyn MediaStream>, CaptureError> {
        let source = stream_id
            .0
            .strip_prefix("file://")
            .unwrap_or(&stream_id.0)
            .to_string();
        let shared = Arc::new(Shared::default());
        let (opened_tx, opened_rx) = crossbeam_channel::bounded(1);

        let decode_shared = shared.clone();
        let realtime = self.realtime;
        let thread_source = source.clone();
        thread::Builder::new()
            .name("ffmpeg-decode".into())
            .spawn(move || match Decoder::open(&thread_source) {
                Ok(decoder) => {
                    let _ = opened_tx.send(Ok(()));
                    decoder.run(&decode_shared, realtime);
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                }
            })
            .map_err(|e| CaptureError::Decode(format!("cannot spawn decoder: {e}")))?;

        match opened_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {
                log::info!("Opened media source {source}");
                Ok(Box::new(FfmpegStream { shared }))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                shared.stop.store(true, Ordering::Relaxed);
                Err(CaptureError::SourceGone(format!(
                    "{source} did not open within {OPEN_TIMEOUT:?}"
                )))
            }
        }
    }
}

#[derive(Default)]
struct Latest {
    frame: Option<Frame>,
    dimensions: Option<(u32, u32)>,
    error: Option<CaptureError>,
    ended: bool,
}

#[derive(Default)]
struct Shared {
    latest: Mutex<Latest>,
    stop: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

pub struct FfmpegStream {
    shared: Arc<Shared>,
}

impl MediaStream for FfmpegStream {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.shared.lock().dimensions
    }

    fn current_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut latest = self.shared.lock();
        if let Some(error) = latest.error.clone() {
            return Err(error);
        }
        match latest.frame.take() {
            Some(frame) => Ok(Some(frame)),
            None if latest.ended => Err(CaptureError::SourceGone("end of stream".into())),
            None => Ok(None),
        }
    }

    fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Decoder {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_interval: Option<Duration>,
}

impl Decoder {
    fn open(source: &str) -> Result<Self, CaptureError> {
        ffmpeg_next::init().map_err(|e| CaptureError::Decode(e.to_string()))?;
        let input = ffmpeg_next::format::input(&source).map_err(|e| open_error(source, e))?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::Decode(format!("{source} has no video stream")))?;
        let stream_index = stream.index();
        let rate = stream.rate();
        let frame_interval = (rate.numerator() > 0 && rate.denominator() > 0).then(|| {
            Duration::from_secs_f64(rate.denominator() as f64 / rate.numerator() as f64)
        });

        let decode_err = |e: ffmpeg_next::Error| CaptureError::Decode(e.to_string());
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(decode_err)?
            .decoder()
            .video()
            .map_err(decode_err)?;
        let (width, height) = (decoder.width(), decoder.height());
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(decode_err)?;

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            frame_interval,
        })
    }

    fn run(self, shared: &Shared, realtime: bool) {
        let Decoder {
            mut input,
            mut decoder,
            mut scaler,
            stream_index,
            width,
            height,
            frame_interval,
        } = self;
        let pace = if realtime { frame_interval } else { None };
        let started = Instant::now();
        let mut index: u64 = 0;

        let mut publish = |decoder: &mut ffmpeg_next::decoder::Video| -> bool {
            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            while decoder.receive_frame(&mut decoded).is_ok() {
                if shared.stopped() {
                    return false;
                }
                let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
                if let Err(e) = scaler.run(&decoded, &mut rgb) {
                    shared.lock().error = Some(CaptureError::Decode(e.to_string()));
                    return false;
                }
                let frame = Frame::new(extract_rgb_pixels(&rgb, width, height), width, height, index);
                {
                    let mut latest = shared.lock();
                    latest.dimensions = Some((width, height));
                    latest.frame = Some(frame);
                }
                index += 1;
                if let Some(interval) = pace {
                    sleep_until(started + interval * index as u32, shared);
                }
            }
            true
        };

        for (stream, packet) in input.packets() {
            if shared.stopped() {
                return;
            }
            if stream.index() != stream_index || decoder.send_packet(&packet).is_err() {
                continue;
            }
            if !publish(&mut decoder) {
                return;
            }
        }
        let _ = decoder.send_eof();
        publish(&mut decoder);
        shared.lock().ended = true;
        log::info!("Media source ended after {index} frames");
    }
}

fn sleep_until(deadline: Instant, shared: &Shared) {
    loop {
        let now = Instant::now();
        if now >= deadline || shared.stopped() {
            return;
        }
        thread::sleep((deadline - now).min(PACING_SLICE));
    }
}

fn open_error(source: &str, e: ffmpeg_next::Error) -> CaptureError {
    if let ffmpeg_next::Error::Other { errno } = e {
        match std::io::Error::from_raw_os_error(errno).kind() {
            std::io::ErrorKind::PermissionDenied => {
                return CaptureError::PermissionDenied(source.to_string())
            }
            std::io::ErrorKind::NotFound => return CaptureError::SourceGone(source.to_string()),
            _ => {}
        }
    }
    CaptureError::SourceGone(format!("{source}: {e}"))
}

/// Copies a possibly row-padded RGB24 plane into a packed buffer.
fn extract_rgb_pixels(
    rgb: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_len = width as usize * 3;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_source_gone() {
        let mut provider = FfmpegStreamProvider::new(false);
        let err = provider
            .acquire(&StreamId("file:///nonexistent/call.mp4".into()))
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::SourceGone(_)));
    }

    #[test]
    fn test_ended_stream_reports_source_gone() {
        let shared = Arc::new(Shared::default());
        shared.lock().ended = true;
        let mut stream = FfmpegStream { shared };
        assert!(matches!(
            stream.current_frame(),
            Err(CaptureError::SourceGone(_))
        ));
    }

    #[test]
    fn test_latest_frame_is_taken_once() {
        let shared = Arc::new(Shared::default());
        {
            let mut latest = shared.lock();
            latest.dimensions = Some((2, 2));
            latest.frame = Some(Frame::new(vec![0; 12], 2, 2, 7));
        }
        let mut stream = FfmpegStream { shared };
        assert_eq!(stream.dimensions(), Some((2, 2)));
        assert_eq!(stream.current_frame().unwrap().map(|f| f.index()), Some(7));
        assert!(stream.current_frame().unwrap().is_none());
        stream.stop();
        assert!(stream.shared.stopped());
    }
}
