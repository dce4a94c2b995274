use std::path::PathBuf;

use clap::Args;
use log::info;
use stk_calib::synthetic::{SyntheticRig, calibration_poses, stereo_poses};
use stk_core::Side;
use stk_io::{CalibrationStore, save_gray};

#[derive(Debug, Args)]
pub struct SyntheticArgs {
    /// Where to write the ground-truth calibration.
    #[arg(long, default_value = "calibration.json")]
    pub calibration: PathBuf,

    /// Also render board views into `<dir>/intrinsics/{left,right}` and
    /// `<dir>/stereo/{left,right}`.
    #[arg(long)]
    pub render: Option<PathBuf>,

    #[arg(long, default_value_t = 20)]
    pub views: usize,
}

pub fn generate(args: &SyntheticArgs) -> anyhow::Result<()> {
    let rig = SyntheticRig::default();
    let record = rig.record()?;
    CalibrationStore::new(&args.calibration).save(&record)?;
    info!("wrote {}", args.calibration.display());

    if let Some(dir) = &args.render {
        let baseline_mm = rig.stereo.translation.norm();
        for side in Side::BOTH {
            let camera_dir = dir.join("intrinsics").join(side.to_string());
            // Single-camera views are posed in front of each camera, so the
            // right camera gets them through the inverse stereo transform.
            for (i, pose) in calibration_poses(&rig.board, args.views, 600.0).iter().enumerate() {
                let left_pose = match side {
                    Side::Left => *pose,
                    Side::Right => rig.stereo.inverse().compose(pose),
                };
                save_gray(camera_dir.join(format!("{i:03}.png")), &rig.render(side, &left_pose))?;
            }
        }
        for (i, pose) in stereo_poses(&rig.board, args.views, 650.0, baseline_mm)
            .iter()
            .enumerate()
        {
            for side in Side::BOTH {
                let path = dir.join("stereo").join(side.to_string()).join(format!("{i:03}.png"));
                save_gray(path, &rig.render(side, pose))?;
            }
        }
        info!("rendered {} views per set into {}", args.views, dir.display());
    }

    println!("{}", serde_json::to_string_pretty(&record.summary())?);
    Ok(())
}
