use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::core::error::{Result, StoryboardError};

/// Final storyboard width; the montage canvas is extended to this before
/// the background is tiled behind it.
pub const STORYBOARD_WIDTH: u32 = 1920;

/// Captured frames are resized to this width when the timestamp overlay is
/// burned in, so montage cells stay uniform.
const FRAME_WIDTH: &str = "600x";

/// Montage cell geometry: frame width plus a 5px margin on each side.
const MONTAGE_GEOMETRY: &str = "600x+5+5";
const MONTAGE_COLUMNS: &str = "3x";

/// Metadata panel canvas, sized to sit above the extended montage.
const PANEL_SIZE: &str = "1920x320";

/// The image operations the capture and composition pipelines request.
/// Implementations execute them; callers only decide what to ask for and
/// in what order.
pub trait ImageOps {
    /// Burn `token` into the bottom-left corner of `image`, in place,
    /// resizing the frame to the montage cell width. Two text passes keep
    /// the timestamp legible over arbitrary content: black outline, then
    /// white fill.
    fn annotate_timestamp(&self, image: &Path, token: &str) -> Result<()>;

    /// Render the text file as a transparent-background panel image, with
    /// the same outline-then-fill treatment.
    fn render_text_panel(&self, text_file: &Path, out: &Path) -> Result<()>;

    /// Tile `frames`, in the order given, into a grid.
    fn montage(&self, frames: &[PathBuf], out: &Path) -> Result<()>;

    /// Re-extend the canvas of `image` to `width`, centered, in place.
    fn extend_canvas(&self, image: &Path, width: u32) -> Result<()>;

    /// Stack `panel` above `body` into one image.
    fn stack_panel(&self, panel: &Path, body: &Path, out: &Path) -> Result<()>;

    fn identify_dimensions(&self, image: &Path) -> Result<(u32, u32)>;

    fn tile_pattern(&self, pattern: &Path, width: u32, height: u32, out: &Path) -> Result<()>;

    fn flat_canvas(&self, color: &str, width: u32, height: u32, out: &Path) -> Result<()>;

    /// True-color overlay of `foreground` onto `background`.
    fn composite(&self, foreground: &Path, background: &Path, out: &Path) -> Result<()>;
}

/// [`ImageOps`] backed by the external ImageMagick `magick` binary.
#[derive(Debug, Clone)]
pub struct Magick {
    program: PathBuf,
}

impl Magick {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    fn run(&self, mut cmd: Command) -> Result<Output> {
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(StoryboardError::ExternalTool {
                tool: "magick",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl ImageOps for Magick {
    fn annotate_timestamp(&self, image: &Path, token: &str) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg(image)
            .arg("-resize").arg(FRAME_WIDTH)
            .arg("-gravity").arg("SouthWest")
            .arg("-pointsize").arg("24")
            .arg("-fill").arg("white")
            .arg("-stroke").arg("black")
            .arg("-strokewidth").arg("4")
            .arg("-annotate").arg("+10+10").arg(token)
            .arg("-fill").arg("white")
            .arg("-stroke").arg("none")
            .arg("-annotate").arg("+10+10").arg(token)
            .arg(image);
        self.run(cmd)?;
        Ok(())
    }

    fn render_text_panel(&self, text_file: &Path, out: &Path) -> Result<()> {
        let text_source = format!("@{}", text_file.display());
        let mut cmd = self.command();
        cmd.arg("-size").arg(PANEL_SIZE)
            .arg("xc:transparent")
            .arg("-fill").arg("white")
            .arg("-pointsize").arg("24")
            .arg("-stroke").arg("black")
            .arg("-strokewidth").arg("2")
            .arg("-annotate").arg("+60+60").arg(&text_source)
            .arg("-fill").arg("white")
            .arg("-stroke").arg("none")
            .arg("-annotate").arg("+60+60").arg(&text_source)
            .arg(out);
        self.run(cmd)?;
        Ok(())
    }

    fn montage(&self, frames: &[PathBuf], out: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("montage");
        for frame in frames {
            cmd.arg(frame);
        }
        cmd.arg("-background").arg("none")
            .arg("-geometry").arg(MONTAGE_GEOMETRY)
            .arg("-tile").arg(MONTAGE_COLUMNS)
            .arg(out);
        self.run(cmd)?;
        Ok(())
    }

    fn extend_canvas(&self, image: &Path, width: u32) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg(image)
            .arg("-background").arg("none")
            .arg("-gravity").arg("center")
            .arg("-extent").arg(format!("{}x", width))
            .arg(image);
        self.run(cmd)?;
        Ok(())
    }

    fn stack_panel(&self, panel: &Path, body: &Path, out: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("montage")
            .arg(panel)
            .arg(body)
            .arg("-background").arg("none")
            .arg("-geometry").arg("+0+0")
            .arg("-tile").arg("1x2")
            .arg(out);
        self.run(cmd)?;
        Ok(())
    }

    fn identify_dimensions(&self, image: &Path) -> Result<(u32, u32)> {
        let mut cmd = self.command();
        cmd.arg("identify")
            .arg("-format").arg("%w %h")
            .arg(image);
        let output = self.run(cmd)?;
        let text = String::from_utf8_lossy(&output.stdout);
        let mut parts = text.split_whitespace();
        let parse = |value: Option<&str>| -> Result<u32> {
            value
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| StoryboardError::ExternalTool {
                    tool: "magick",
                    detail: format!("unparsable identify output: {:?}", text),
                })
        };
        let width = parse(parts.next())?;
        let height = parse(parts.next())?;
        Ok((width, height))
    }

    fn tile_pattern(&self, pattern: &Path, width: u32, height: u32, out: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("-size").arg(format!("{}x{}", width, height))
            .arg(format!("tile:{}", pattern.display()))
            .arg(out);
        self.run(cmd)?;
        Ok(())
    }

    fn flat_canvas(&self, color: &str, width: u32, height: u32, out: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("-size").arg(format!("{}x{}", width, height))
            .arg(format!("canvas:{}", color))
            .arg(out);
        self.run(cmd)?;
        Ok(())
    }

    fn composite(&self, foreground: &Path, background: &Path, out: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("composite")
            .arg("-type").arg("truecolor")
            .arg(foreground)
            .arg(background)
            .arg(out);
        self.run(cmd)?;
        Ok(())
    }
}
