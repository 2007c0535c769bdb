//! Vina/QVina result table parsing
//!
//! The pose table follows a header mentioning `rmsd l.b.`:
//!
//! ```text
//! mode |   affinity | dist from best mode
//!      | (kcal/mol) | rmsd l.b.| rmsd u.b.
//! -----+------------+----------+----------
//!    1         -7.2      0.000      0.000
//!    2         -6.9      1.822      2.630
//! ```

use std::fs;
use std::path::Path;

use crate::io::IoError;

/// One row of the pose table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub mode: u32,
    pub affinity: f64,
    pub rmsd_lb: f64,
    pub rmsd_ub: f64,
}

fn parse_pose(line: &str) -> Option<Pose> {
    let mut fields = line.split_whitespace();
    let pose = Pose {
        mode: fields.next()?.parse().ok()?,
        affinity: fields.next()?.parse().ok()?,
        rmsd_lb: fields.next()?.parse().ok()?,
        rmsd_ub: fields.next()?.parse().unwrap_or(f64::NAN),
    };
    Some(pose)
}

/// All poses listed after the table header.
///
/// Lines that do not start with a digit are skipped until the first pose and
/// end the table afterwards.
pub fn parse_vina_poses(text: &str) -> Vec<Pose> {
    let mut poses = Vec::new();
    let mut in_table = false;

    for line in text.lines() {
        if line.to_lowercase().contains("rmsd l.b.") {
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }

        let stripped = line.trim();
        if !stripped.starts_with(|c: char| c.is_ascii_digit()) {
            if poses.is_empty() {
                continue;
            }
            break;
        }
        if let Some(pose) = parse_pose(stripped) {
            poses.push(pose);
        }
    }

    poses
}

/// The pose with the smallest finite `rmsd l.b.`; the earliest one wins ties
pub fn best_pose(poses: &[Pose]) -> Option<Pose> {
    poses
        .iter()
        .copied()
        .filter(|pose| pose.rmsd_lb.is_finite())
        .fold(None, |best, pose| match best {
            Some(current) if current.rmsd_lb <= pose.rmsd_lb => Some(current),
            _ => Some(pose),
        })
}

/// Affinity reported for a docking log, `None` when no pose can be read
pub fn read_vina_affinity<P: AsRef<Path>>(log_file: P) -> Result<Option<f64>, IoError> {
    let text = fs::read_to_string(log_file)?;
    Ok(best_pose(&parse_vina_poses(&text)).map(|pose| pose.affinity))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
Detected 8 CPUs
Reading input ... done.
mode |   affinity | dist from best mode
     | (kcal/mol) | rmsd l.b.| rmsd u.b.
-----+------------+----------+----------
   1         -5.0      2.000      3.000
   2         -6.0      0.500      1.000
   3         -4.0      5.000      6.000
Writing output ... done.
   4        -99.0      0.000      0.000
";

    #[test]
    fn test_min_rmsd_pose_wins() {
        let poses = parse_vina_poses(LOG);
        assert_eq!(poses.len(), 3);
        assert_eq!(best_pose(&poses).unwrap().affinity, -6.0);
    }

    #[test]
    fn test_ties_keep_first_pose() {
        let poses = parse_vina_poses(
            "rmsd l.b.\n   1   -7.1   0.000   0.000\n   2   -6.5   0.000   0.000\n",
        );
        assert_eq!(best_pose(&poses).unwrap().mode, 1);
    }

    #[test]
    fn test_non_finite_rmsd_is_ignored() {
        let text = "rmsd l.b.\n   1   -9.0   nan   0.000\n   2   -6.5   1.000   2.000\n   3   -8.0   NaN   0.000\n";
        let poses = parse_vina_poses(text);
        assert_eq!(poses.len(), 3);
        assert_eq!(best_pose(&poses).unwrap().mode, 2);

        let only_nan = parse_vina_poses("rmsd l.b.\n   1   -9.0   nan   0.000\n");
        assert!(best_pose(&only_nan).is_none());
    }

    #[test]
    fn test_no_table() {
        assert!(parse_vina_poses("mode | affinity\n   1  -5.0  0.0  0.0\n").is_empty());
        assert!(best_pose(&[]).is_none());
    }
}
