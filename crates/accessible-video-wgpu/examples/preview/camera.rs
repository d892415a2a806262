//! A CPU-generated NV12 test pattern standing in for a camera

use accessible_video_wgpu::{CameraFrame, Nv12Textures};

pub const CAMERA_WIDTH: u32 = 640;
pub const CAMERA_HEIGHT: u32 = 480;

/// Produces a diagonal luma ramp that scrolls one step per frame, over a slow chroma sweep
pub struct SyntheticCamera {
    planes: Nv12Textures,
    luma: Vec<u8>,
    chroma: Vec<u8>,
    frame_index: u32,
}

impl SyntheticCamera {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            planes: Nv12Textures::new(device, CAMERA_WIDTH, CAMERA_HEIGHT),
            luma: vec![0; (CAMERA_WIDTH * CAMERA_HEIGHT) as usize],
            chroma: vec![0; (CAMERA_WIDTH * CAMERA_HEIGHT / 2) as usize],
            frame_index: 0,
        }
    }

    /// Generates the next frame and uploads it
    pub fn next_frame(&mut self, queue: &wgpu::Queue) -> CameraFrame<'_> {
        let shift = self.frame_index;
        for y in 0..CAMERA_HEIGHT {
            for x in 0..CAMERA_WIDTH {
                // Hard edges every 32 steps give edge filters something to find
                let ramp = (x + y + shift) % 256;
                self.luma[(y * CAMERA_WIDTH + x) as usize] = if ramp % 64 < 32 { ramp as u8 } else { 255 - ramp as u8 };
            }
        }

        let hue = (shift / 4 % 256) as u8;
        for texel in self.chroma.chunks_exact_mut(2) {
            texel[0] = hue;
            texel[1] = 255 - hue;
        }

        self.planes.write(queue, &self.luma, &self.chroma);
        self.frame_index = self.frame_index.wrapping_add(1);
        self.planes.frame()
    }
}
