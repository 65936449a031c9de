use std::path::Path;

use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

type FrameResult = Result<Frame, Box<dyn std::error::Error>>;

/// Reads the best video stream of a container with ffmpeg-next and yields
/// its frames as packed RGB24.
pub struct FfmpegReader {
    input: Option<Input>,
    stream_index: usize,
}

// Safety: the reader is moved to the decode thread once and used only there;
// the ffmpeg contexts inside are never shared.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input: None,
            stream_index: 0,
        }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

fn video_decoder(
    stream: &ffmpeg_next::format::stream::Stream,
) -> Result<ffmpeg_next::decoder::Video, ffmpeg_next::Error> {
    ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
        .decoder()
        .video()
}

fn frames_per_second(rate: ffmpeg_next::Rational) -> f64 {
    match rate.denominator() {
        0 => 0.0,
        den => f64::from(rate.numerator()) / f64::from(den),
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let input = ffmpeg_next::format::input(path)
            .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| format!("no video stream in {}", path.display()))?;
        let decoder = video_decoder(&stream)?;

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps: frames_per_second(stream.rate()),
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|codec| codec.name().to_owned())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };
        log::debug!(
            "Opened {}: {}x{} @ {:.2} fps, {} frames ({})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames,
            metadata.codec
        );

        self.stream_index = stream.index();
        self.input = Some(input);
        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
        let Some(input) = self.input.as_mut() else {
            return Box::new(std::iter::once(Err("FfmpegReader: not opened".into())));
        };
        match DecodeIter::new(input, self.stream_index) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.input = None;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Feeding packets from the container.
    Reading,
    /// Container exhausted; emptying the decoder's queue.
    Draining,
    Finished,
}

/// Decodes on demand, so only the frames in flight are held in memory.
struct DecodeIter<'a> {
    input: &'a mut Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    next_index: usize,
    state: DecodeState,
}

impl<'a> DecodeIter<'a> {
    fn new(input: &'a mut Input, stream_index: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = input
            .stream(stream_index)
            .ok_or("FfmpegReader: video stream disappeared")?;
        let decoder = video_decoder(&stream)?;
        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            next_index: 0,
            state: DecodeState::Reading,
        })
    }

    /// Pulls one decoded picture, if the decoder has one ready.
    fn receive(&mut self) -> Option<FrameResult> {
        let mut decoded = Video::empty();
        self.decoder.receive_frame(&mut decoded).ok()?;

        let mut rgb = Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb) {
            return Some(Err(e.into()));
        }
        let frame = packed_rgb_frame(&rgb, self.next_index);
        self.next_index += 1;
        Some(Ok(frame))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = FrameResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                DecodeState::Finished => return None,
                DecodeState::Draining => {
                    let result = self.receive();
                    if result.is_none() {
                        self.state = DecodeState::Finished;
                    }
                    return result;
                }
                DecodeState::Reading => {
                    if let Some(result) = self.receive() {
                        return Some(result);
                    }
                    match self.input.packets().next() {
                        Some((stream, packet)) => {
                            if stream.index() != self.stream_index {
                                continue;
                            }
                            if let Err(e) = self.decoder.send_packet(&packet) {
                                log::warn!("Skipping undecodable packet: {e}");
                            }
                        }
                        None => {
                            let _ = self.decoder.send_eof();
                            self.state = DecodeState::Draining;
                        }
                    }
                }
            }
        }
    }
}

/// Packs an RGB24 picture into a [`Frame`], dropping ffmpeg's row padding.
fn packed_rgb_frame(rgb: &Video, index: usize) -> Frame {
    let (width, height) = (rgb.width(), rgb.height());
    let row_bytes = width as usize * 3;
    let pixels: Vec<u8> = rgb
        .data(0)
        .chunks(rgb.stride(0))
        .take(height as usize)
        .flat_map(|row| &row[..row_bytes])
        .copied()
        .collect();
    Frame::new(pixels, width, height, 3, index)
}
