mod capture;
mod core;
mod gui;
mod imaging;
mod storyboard;
mod video;

use eframe::egui;
use gui::StoryboardApp;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 800.0])
            .with_title("Storyboard Helper - Video Frame Capture"),
        ..Default::default()
    };

    eframe::run_native(
        "Storyboard Helper",
        options,
        Box::new(|cc| {
            match StoryboardApp::new(cc) {
                Ok(app) => Ok(Box::new(app)),
                Err(e) => {
                    eprintln!("Failed to initialize app: {}", e);
                    std::process::exit(1);
                }
            }
        }),
    ).map_err(|e| anyhow::anyhow!("Failed to run app: {}", e))?;

    Ok(())
}
