//! Command-line surface.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Encode-and-distribute server for a distributed real-time rendering
/// pipeline.
#[derive(Debug, Parser)]
#[command(name = "framecast-server", version, about, disable_version_flag = true)]
pub struct Args {
    /// Address of a renderer as host:port; repeat for every renderer.
    #[arg(short = 'r', long = "renderer", value_name = "HOST:PORT")]
    pub renderer: Vec<String>,

    /// Width of the requested image.
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Height of the requested image.
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Bitrate of the output stream in bits per second.
    #[arg(long, default_value_t = 400_000)]
    pub bitrate: u32,

    /// Frames per second of the output stream. This does not guarantee
    /// that this many frames will be present.
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Group of pictures (GOP) size in frames.
    #[arg(long, default_value_t = 250)]
    pub keyint: u32,

    /// Encoder preset {ultrafast, superfast, veryfast, faster, fast,
    /// medium, slow, slower, veryslow, placebo}.
    #[arg(long = "encode_preset", default_value = "ultrafast")]
    pub encode_preset: String,

    /// Encoder tune {film, animation, grain, stillimage, fastdecode,
    /// zerolatency, psnr, ssim}, comma separated.
    #[arg(short = 't', long = "encode_tune", default_value = "stillimage,zerolatency")]
    pub encode_tune: String,

    /// Location of a font file used to render overlay texts.
    #[arg(
        long,
        default_value = "/usr/share/fonts/truetype/noto/NotoMono-Regular.ttf"
    )]
    pub font: PathBuf,

    /// Port the camera control websocket server should bind to.
    #[arg(long = "camera_control_server_port", default_value_t = 9998)]
    pub camera_control_server_port: u16,

    /// Port the packet stream websocket server should bind to.
    #[arg(long = "packet_stream_server_port", default_value_t = 9999)]
    pub packet_stream_server_port: u16,

    /// Display the version of the encode server.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

impl Args {
    /// Checks that survive parsing but make the configuration unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be nonzero".to_string());
        }
        if self.fps == 0 {
            return Err("fps must be nonzero".to_string());
        }
        if !self.font.is_file() {
            return Err(format!("font file not found: {}", self.font.display()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let args = Args::try_parse_from(["framecast-server"]).unwrap();
        assert!(args.renderer.is_empty());
        assert_eq!((args.width, args.height), (1280, 720));
        assert_eq!(args.bitrate, 400_000);
        assert_eq!(args.fps, 30);
        assert_eq!(args.keyint, 250);
        assert_eq!(args.encode_preset, "ultrafast");
        assert_eq!(args.encode_tune, "stillimage,zerolatency");
        assert_eq!(args.camera_control_server_port, 9998);
        assert_eq!(args.packet_stream_server_port, 9999);
    }

    #[test]
    fn renderer_flag_repeats() {
        let args = Args::try_parse_from([
            "framecast-server",
            "--renderer",
            "10.0.0.1:9991",
            "-r",
            "10.0.0.2:9991",
        ])
        .unwrap();
        assert_eq!(args.renderer, vec!["10.0.0.1:9991", "10.0.0.2:9991"]);
    }

    #[test]
    fn zero_dimensions_fail_validation() {
        let args = Args::try_parse_from(["framecast-server", "--width", "0"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn zero_fps_fails_validation() {
        let args = Args::try_parse_from(["framecast-server", "--fps", "0"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn missing_font_fails_validation() {
        let args = Args::try_parse_from([
            "framecast-server",
            "--font",
            "/nonexistent/font.ttf",
        ])
        .unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn unknown_flag_is_a_parse_error() {
        assert!(Args::try_parse_from(["framecast-server", "--bogus"]).is_err());
    }
}
