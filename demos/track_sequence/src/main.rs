use argh::FromArgs;
use std::path::{Path, PathBuf};

use sparseflow::image::Image;
use sparseflow::tracking::{DetectorAlgorithm, OpticalFlowTracker, TrackerConfig};

#[derive(FromArgs)]
/// Track sparse features over a directory of images and print the good vectors
struct Args {
    /// path to a directory with the frames, processed in file name order
    #[argh(option, short = 'i')]
    input_dir: PathBuf,

    /// optional JSON file with the tracker configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// override the tracking window radius
    #[argh(option)]
    radius: Option<usize>,

    /// use the placeholder fast detector instead of eigenvalues
    #[argh(switch)]
    fast: bool,

    /// print every good vector as a JSON line
    #[argh(switch)]
    json: bool,
}

fn read_gray(path: &Path) -> Result<Image<u8, 1>, Box<dyn std::error::Error>> {
    let gray = image::open(path)?.to_luma8();
    let size = [gray.width() as usize, gray.height() as usize];
    Ok(Image::new(size.into(), gray.into_raw())?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => serde_json::from_str::<TrackerConfig>(&std::fs::read_to_string(path)?)?,
        None => TrackerConfig::default(),
    };
    if let Some(radius) = args.radius {
        config.window_radius = radius;
    }
    if args.fast {
        config.detector_algorithm = DetectorAlgorithm::Fast;
    }

    let mut tracker = OpticalFlowTracker::with_config(&config);
    log::info!("tracking with {:?}", tracker.config());

    let mut frames = std::fs::read_dir(&args.input_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    frames.sort();

    for (n, path) in frames.iter().enumerate() {
        let frame = match read_gray(path) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("skipping {}: {err}", path.display());
                continue;
            }
        };

        if let Err(err) = tracker.process_frame(&frame) {
            log::warn!("skipping {}: {err}", path.display());
            continue;
        }

        println!(
            "frame {n}: {} features, {} vectors, {} good",
            tracker.feature_count(),
            tracker.vector_count(),
            tracker.good_vector_count()
        );

        for v in tracker.good_vectors() {
            if args.json {
                println!("{}", serde_json::to_string(v)?);
            } else {
                let [x, y] = v.origin_px(frame.size());
                println!(
                    "  #{:<5} ({x:7.2}, {y:7.2}) alpha {:.4} theta {:6.1}",
                    v.index, v.alpha, v.theta
                );
            }
        }
    }

    Ok(())
}
