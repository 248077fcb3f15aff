//! Colour-space conversion into the encoder's pixel format.

use framecast_proto::Camera;

use crate::frame::{ConvertedFrame, PixelFormat, RawFrame};

/// Plane strides are rounded up to this multiple so the encoder can use
/// aligned SIMD loads.
pub const STRIDE_ALIGN_BYTES: usize = 32;

fn aligned_stride(width: usize) -> usize {
    width.div_ceil(STRIDE_ALIGN_BYTES) * STRIDE_ALIGN_BYTES
}

/// Convert the scene plane of `frame` to planar YUV 4:2:0 at the encoder's
/// current `dst_width` x `dst_height`, consuming the raw frame. When the
/// camera and encoder dimensions differ the image is rescaled with
/// nearest-neighbour sampling; chroma samples average each 2x2 block.
///
/// Uses BT.601 limited-range coefficients, the convention browser decoders
/// assume for streams without colourspace metadata.
pub fn convert_to_i420(frame: RawFrame, dst_width: u32, dst_height: u32) -> ConvertedFrame {
    let src_width = frame.width() as usize;
    let src_height = frame.height() as usize;
    let dst_w = dst_width as usize & !1;
    let dst_h = dst_height as usize & !1;

    let y_stride = aligned_stride(dst_w);
    let c_stride = aligned_stride(dst_w / 2);
    let mut y_plane = vec![0u8; y_stride * dst_h];
    let mut u_plane = vec![0u8; c_stride * (dst_h / 2)];
    let mut v_plane = vec![0u8; c_stride * (dst_h / 2)];

    let rgb = frame.scene();
    let sample = |dst_x: usize, dst_y: usize| -> (i32, i32, i32) {
        let src_x = dst_x * src_width / dst_w;
        let src_y = dst_y * src_height / dst_h;
        let offset = (src_y * src_width + src_x) * 3;
        (
            rgb[offset] as i32,
            rgb[offset + 1] as i32,
            rgb[offset + 2] as i32,
        )
    };

    for dst_y in 0..dst_h {
        let row = dst_y * y_stride;
        for dst_x in 0..dst_w {
            let (r, g, b) = sample(dst_x, dst_y);
            let luma = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[row + dst_x] = luma.clamp(0, 255) as u8;
        }
    }

    for chroma_y in 0..dst_h / 2 {
        let row = chroma_y * c_stride;
        for chroma_x in 0..dst_w / 2 {
            let mut r_sum = 0;
            let mut g_sum = 0;
            let mut b_sum = 0;
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (r, g, b) = sample(chroma_x * 2 + dx, chroma_y * 2 + dy);
                r_sum += r;
                g_sum += g;
                b_sum += b;
            }
            let (r, g, b) = (r_sum / 4, g_sum / 4, b_sum / 4);
            let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
            let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
            u_plane[row + chroma_x] = u.clamp(0, 255) as u8;
            v_plane[row + chroma_x] = v.clamp(0, 255) as u8;
        }
    }

    let index = frame.index();
    let camera: Camera = frame.camera().clone();
    ConvertedFrame::new(
        index,
        camera,
        dst_w as u32,
        dst_h as u32,
        PixelFormat::I420,
        [y_plane, u_plane, v_plane],
        [y_stride, c_stride, c_stride],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> RawFrame {
        let camera = Camera {
            matrix: [0.0; 12],
            width,
            height,
            is_left: false,
        };
        let mut scene = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            scene.extend_from_slice(&rgb);
        }
        RawFrame::new(0, camera, scene, None).unwrap()
    }

    #[test]
    fn plane_sizes_follow_aligned_strides() {
        let converted = convert_to_i420(solid_frame(64, 48, [0, 0, 0]), 64, 48);
        assert_eq!(converted.pix_fmt(), PixelFormat::I420);
        assert_eq!(converted.stride(0), 64);
        assert_eq!(converted.stride(1), 32);
        assert_eq!(converted.plane(0).len(), 64 * 48);
        assert_eq!(converted.plane(1).len(), 32 * 24);
        assert_eq!(converted.plane(2).len(), 32 * 24);
    }

    #[test]
    fn narrow_frames_get_padded_strides() {
        let converted = convert_to_i420(solid_frame(10, 10, [0, 0, 0]), 10, 10);
        assert_eq!(converted.stride(0), 32);
        assert_eq!(converted.stride(1), 32);
    }

    #[test]
    fn black_maps_to_limited_range_floor() {
        let converted = convert_to_i420(solid_frame(4, 4, [0, 0, 0]), 4, 4);
        assert_eq!(converted.plane(0)[0], 16);
        assert_eq!(converted.plane(1)[0], 128);
        assert_eq!(converted.plane(2)[0], 128);
    }

    #[test]
    fn white_maps_to_limited_range_ceiling() {
        let converted = convert_to_i420(solid_frame(4, 4, [255, 255, 255]), 4, 4);
        assert_eq!(converted.plane(0)[0], 235);
        assert_eq!(converted.plane(1)[0], 128);
        assert_eq!(converted.plane(2)[0], 128);
    }

    #[test]
    fn red_shifts_chroma_away_from_neutral() {
        let converted = convert_to_i420(solid_frame(4, 4, [255, 0, 0]), 4, 4);
        // BT.601: pure red lands near Y=82, U=90, V=240.
        assert_eq!(converted.plane(0)[0], 82);
        assert!(converted.plane(1)[0] < 100);
        assert!(converted.plane(2)[0] > 220);
    }

    #[test]
    fn rescales_to_the_encoder_dimensions() {
        let converted = convert_to_i420(solid_frame(8, 8, [0, 255, 0]), 4, 4);
        assert_eq!(converted.width(), 4);
        assert_eq!(converted.height(), 4);
        // Still solid green after scaling.
        assert_eq!(converted.plane(0)[0], converted.plane(0)[3]);
    }

    #[test]
    fn odd_target_dimensions_are_rounded_down() {
        let converted = convert_to_i420(solid_frame(8, 8, [0, 0, 0]), 5, 5);
        assert_eq!(converted.width(), 4);
        assert_eq!(converted.height(), 4);
    }

    #[test]
    fn index_and_camera_survive_conversion() {
        let camera = Camera {
            matrix: [1.0; 12],
            width: 4,
            height: 4,
            is_left: false,
        };
        let frame = RawFrame::new(77, camera.clone(), vec![0; 48], None).unwrap();
        let converted = convert_to_i420(frame, 4, 4);
        assert_eq!(converted.index(), 77);
        assert_eq!(converted.camera(), &camera);
    }
}
