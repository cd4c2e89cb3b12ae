//! Video Processing Module
//!
//! Handles probing and decoding of video files using the ffmpeg-next crate.
//! Frames are handed to the caller one at a time so memory stays bounded by
//! whatever the caller decides to keep.

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as ScalingContext, flag::Flags};
use ffmpeg::util::frame::video::Video;
use image::RgbImage;
use anyhow::{anyhow, Context, Result};
use std::ops::ControlFlow;
use std::path::Path;
use log::{debug, info};

/// Stream-level facts needed to plan keyframe sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub frame_count: u64,
    /// Duration in seconds, derived from `frame_count / fps`.
    pub duration: f64,
}

/// Reads frame rate and frame count from the container metadata.
///
/// This is much faster than decoding the whole video, but the frame count
/// can be an estimate for variable frame rate (VFR) videos.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    ffmpeg::init().context("Failed to initialize FFmpeg")?;
    let ictx = input(path)
        .with_context(|| format!("Could not open video file: {:?}", path))?;
    let stream = ictx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| anyhow!("Could not find video stream in file"))?;

    let fps = rational_to_f64(stream.avg_frame_rate())
        .or_else(|| rational_to_f64(stream.rate()))
        .ok_or_else(|| anyhow!("Could not determine frame rate of {:?}", path))?;

    // First, try the most direct method if available in the container
    let mut frame_count = stream.frames().max(0) as u64;
    if frame_count == 0 {
        // Fallback: duration is in AV_TIME_BASE units (microseconds)
        let duration = ictx.duration();
        if duration > 0 {
            let duration_secs = duration as f64 / 1_000_000.0;
            frame_count = (duration_secs * fps).round() as u64;
        }
    }
    if frame_count == 0 {
        return Err(anyhow!("Could not determine frame count from video metadata"));
    }

    let info = VideoInfo {
        fps,
        frame_count,
        duration: frame_count as f64 / fps,
    };
    debug!("Probed {:?}: {:?}", path, info);
    Ok(info)
}

fn rational_to_f64(rate: ffmpeg::Rational) -> Option<f64> {
    if rate.0 > 0 && rate.1 > 0 {
        Some(rate.0 as f64 / rate.1 as f64)
    } else {
        None
    }
}

/// Decodes the video stream in order and hands every `every_nth` frame to `on_frame`.
///
/// All frames are decoded so that frame indices stay exact, but only the
/// sampled ones are converted to RGB. The callback receives the zero-based
/// index of the decoded frame and may return `ControlFlow::Break` to stop
/// decoding early. Returns the number of frames decoded.
pub fn process_frames_stream<F>(path: &Path, every_nth: u64, mut on_frame: F) -> Result<u64>
where
    F: FnMut(u64, RgbImage) -> Result<ControlFlow<()>>,
{
    ffmpeg::init().context("Failed to initialize FFmpeg")?;
    let every_nth = every_nth.max(1);

    let mut ictx = input(path)
        .with_context(|| format!("Could not open video file: {:?}", path))?;
    let input = ictx
        .streams()
        .best(Type::Video)
        .context("Could not find video stream")?;
    let video_stream_index = input.index();

    let context_decoder = ffmpeg::codec::context::Context::from_parameters(input.parameters())
        .context("Failed to create decoder context")?;
    let mut decoder = context_decoder.decoder().video()
        .context("Failed to create video decoder")?;

    let mut scaler = ScalingContext::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        Flags::BILINEAR,
    ).context("Failed to create scaler")?;

    let mut frame_index: u64 = 0;
    let mut receive_and_process_decoded_frames =
        |decoder: &mut ffmpeg::decoder::Video| -> Result<ControlFlow<()>> {
            let mut decoded = Video::empty();
            while decoder.receive_frame(&mut decoded).is_ok() {
                let index = frame_index;
                frame_index += 1;
                if index % every_nth != 0 {
                    continue;
                }

                let mut rgb_frame = Video::empty();
                scaler.run(&decoded, &mut rgb_frame).context("Scaler failed")?;
                let img = rgb_frame_to_image(&rgb_frame)?;

                if on_frame(index, img)?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
            Ok(ControlFlow::Continue(()))
        };

    let mut stopped = false;
    for (stream, packet) in ictx.packets() {
        if stream.index() == video_stream_index {
            decoder.send_packet(&packet).context("Failed to send packet to decoder")?;
            if receive_and_process_decoded_frames(&mut decoder)?.is_break() {
                stopped = true;
                break;
            }
        }
    }
    if !stopped {
        decoder.send_eof().context("Failed to flush decoder")?;
        receive_and_process_decoded_frames(&mut decoder)?;
    }

    info!("Finished decoding {} frames from video stream.", frame_index);
    Ok(frame_index)
}

/// Copies a packed RGB24 frame into an image buffer, dropping row padding.
fn rgb_frame_to_image(rgb_frame: &Video) -> Result<RgbImage> {
    let frame_data = rgb_frame.data(0);
    let width = rgb_frame.width() as usize;
    let height = rgb_frame.height() as usize;
    let stride = rgb_frame.stride(0);

    if stride == 0 {
        return Err(anyhow!("Invalid frame stride"));
    }

    let mut new_vec = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let start_index = y * stride;
        let end_index = start_index + (width * 3);
        if end_index > frame_data.len() {
            return Err(anyhow!("Frame data is smaller than expected"));
        }
        new_vec.extend_from_slice(&frame_data[start_index..end_index]);
    }

    RgbImage::from_vec(width as u32, height as u32, new_vec)
        .context("Failed to create image buffer from frame data")
}
