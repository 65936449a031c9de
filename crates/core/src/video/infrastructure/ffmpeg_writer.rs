use std::path::Path;

use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::Rational;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_writer::VideoWriter;

/// Frame rate used when the source does not report a usable one.
const FALLBACK_FPS: i32 = 30;

/// Everything that exists between `open` and `close`.
struct Session {
    output: Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: scaling::Context,
    width: u32,
    height: u32,
    time_base: Rational,
    frames: usize,
}

impl Session {
    /// Moves every packet the encoder has ready into the container.
    fn drain(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let stream_time_base = self
            .output
            .stream(0)
            .ok_or("FfmpegWriter: output stream missing")?
            .time_base();
        let mut packet = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.time_base, stream_time_base);
            packet.write_interleaved(&mut self.output)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<usize, Box<dyn std::error::Error>> {
        self.encoder.send_eof()?;
        self.drain()?;
        self.output.write_trailer()?;
        Ok(self.frames)
    }
}

/// Encodes RGB frames to MPEG-4 with ffmpeg-next, in the container implied
/// by the output file extension.
pub struct FfmpegWriter {
    session: Option<Session>,
}

// Safety: the writer is moved to the encode thread once and used only there;
// the ffmpeg contexts inside are never shared.
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self { session: None }
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn output_fps(fps: f64) -> i32 {
    let rounded = fps.round() as i32;
    if rounded <= 0 {
        FALLBACK_FPS
    } else {
        rounded
    }
}

impl VideoWriter for FfmpegWriter {
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let (width, height) = (metadata.width, metadata.height);
        let fps = output_fps(metadata.fps);
        let time_base = Rational(1, fps);

        let mut output = ffmpeg_next::format::output(path)
            .map_err(|e| format!("cannot create {}: {e}", path.display()))?;
        let needs_global_header = output
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        // MPEG4 ships with every ffmpeg build
        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;
        let mut stream = output.add_stream(Some(codec))?;

        let mut config = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        config.set_width(width);
        config.set_height(height);
        config.set_format(Pixel::YUV420P);
        config.set_time_base(time_base);
        config.set_frame_rate(Some(Rational(fps, 1)));
        if needs_global_header {
            config.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = config.open_with(ffmpeg_next::Dictionary::new())?;
        stream.set_parameters(&encoder);
        output.write_header()?;

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        self.session = Some(Session {
            output,
            encoder,
            scaler,
            width,
            height,
            time_base,
            frames: 0,
        });
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let session = self.session.as_mut().ok_or("FfmpegWriter: not opened")?;
        if (frame.width(), frame.height(), frame.channels()) != (session.width, session.height, 3)
        {
            return Err(format!(
                "FfmpegWriter: frame {} is {}x{}x{}, expected {}x{} RGB",
                frame.index(),
                frame.width(),
                frame.height(),
                frame.channels(),
                session.width,
                session.height
            )
            .into());
        }

        let mut rgb = Video::new(Pixel::RGB24, session.width, session.height);
        let stride = rgb.stride(0);
        let row_bytes = session.width as usize * 3;
        for (dst, src) in rgb
            .data_mut(0)
            .chunks_mut(stride)
            .zip(frame.data().chunks_exact(row_bytes))
        {
            dst[..row_bytes].copy_from_slice(src);
        }

        let mut yuv = Video::empty();
        session.scaler.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(session.frames as i64));

        session.encoder.send_frame(&yuv)?;
        session.drain()?;
        session.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(session) = self.session.take() {
            let frames = session.finish()?;
            log::debug!("Encoded {frames} frames");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::domain::video_reader::VideoReader;
    use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;

    fn metadata(w: u32, h: u32, fps: f64) -> VideoMetadata {
        VideoMetadata {
            width: w,
            height: h,
            fps,
            total_frames: 0,
            codec: String::new(),
            source_path: None,
        }
    }

    fn solid_frame(index: usize, w: u32, h: u32, value: u8) -> Frame {
        let data = vec![value; (w * h * 3) as usize];
        Frame::new(data, w, h, 3, index)
    }

    #[test]
    fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &metadata(160, 120, 30.0)).unwrap();
        for i in 0..3 {
            writer.write(&solid_frame(i, 160, 120, 128)).unwrap();
        }
        writer.close().unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_write_without_open_returns_error() {
        let mut writer = FfmpegWriter::new();
        assert!(writer.write(&solid_frame(0, 160, 120, 128)).is_err());
    }

    #[test]
    fn test_write_rejects_mismatched_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &metadata(160, 120, 30.0)).unwrap();
        let err = writer.write(&solid_frame(0, 80, 60, 128)).unwrap_err();
        assert!(err.to_string().contains("expected 160x120"));
        writer.close().unwrap();
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &metadata(160, 120, 30.0)).unwrap();
        writer.write(&solid_frame(0, 160, 120, 128)).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_unknown_fps_falls_back() {
        assert_eq!(output_fps(0.0), FALLBACK_FPS);
        assert_eq!(output_fps(f64::NAN), FALLBACK_FPS);
        assert_eq!(output_fps(29.97), 30);
    }

    #[test]
    fn test_roundtrip_preserves_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.mp4");

        let mut writer = FfmpegWriter::new();
        writer.open(&path, &metadata(160, 120, 25.0)).unwrap();
        for i in 0..3 {
            writer.write(&solid_frame(i, 160, 120, 128)).unwrap();
        }
        writer.close().unwrap();

        let mut reader = FfmpegReader::new();
        let read_meta = reader.open(&path).unwrap();
        assert_eq!((read_meta.width, read_meta.height), (160, 120));

        let frames: Vec<_> = reader.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 3);

        // lossy codec, brightness stays close
        let first = &frames[0];
        let avg: f64 =
            first.data().iter().map(|&b| b as f64).sum::<f64>() / first.data().len() as f64;
        assert!((avg - 128.0).abs() < 40.0, "average pixel value {avg}");
    }
}
