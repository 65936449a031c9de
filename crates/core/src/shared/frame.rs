use image::GrayImage;
use ndarray::{ArrayView3, ArrayViewMut3};

/// Channel counts the detection and tracking primitives understand.
pub const SUPPORTED_CHANNELS: &[u8] = &[1, 3];

/// A single video frame: contiguous bytes in row-major order (RGB or gray).
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque apart from the grayscale view.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Checks the raster is usable on its own: non-empty, a supported
    /// channel count, and a buffer matching its dimensions.
    pub fn check_well_formed(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "frame {} has zero size ({}x{})",
                self.index, self.width, self.height
            ));
        }
        if !SUPPORTED_CHANNELS.contains(&self.channels) {
            return Err(format!(
                "frame {} has unsupported channel count {}",
                self.index, self.channels
            ));
        }
        let expected = (self.width as usize) * (self.height as usize) * (self.channels as usize);
        if self.data.len() != expected {
            return Err(format!(
                "frame {} holds {} bytes, expected {expected}",
                self.index,
                self.data.len()
            ));
        }
        Ok(())
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Luma view using BT.601 weights; single-channel frames are copied as-is.
    pub fn to_gray_image(&self) -> GrayImage {
        let pixels: Vec<u8> = if self.channels == 1 {
            self.data.clone()
        } else {
            self.data
                .chunks_exact(self.channels as usize)
                .map(|px| {
                    let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                    luma.round().min(255.0) as u8
                })
                .collect()
        };
        GrayImage::from_raw(self.width, self.height, pixels)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
