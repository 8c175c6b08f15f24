//! Clustering of motion vectors into groups of similar neighbours.
//!
//! Two vectors are friends when their origins are close and they describe
//! the same motion: either both barely move, or they point in the same
//! direction with a similar length. A vector needs more friends than a quorum
//! proportional to the vector count to be trusted.

use crate::vector::Vector;

/// Friends must have origins closer than this squared normalized distance.
pub const NEIGHBOR_DISTANCE_SQ: f32 = 0.03;

/// Vectors shorter than this are treated as stationary.
pub const SMALL_MOVEMENT: f32 = 0.007;

/// Fraction of the vector count that makes the friend quorum.
pub const QUORUM_RATIO: f32 = 0.015625;

/// Result of a clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FriendStats {
    /// Friend quorum for this vector population.
    pub max_friends: u32,
    /// Number of good vectors.
    pub good_count: usize,
}

/// Friend quorum for `vector_count` vectors.
pub fn max_friends(vector_count: usize) -> u32 {
    (vector_count as f32 * QUORUM_RATIO).floor() as u32
}

/// Whether two directions in degrees are within 22.5 degrees of each other.
pub fn directions_agree(theta_a: f32, theta_b: f32) -> bool {
    let d = theta_a - theta_b;
    d < -337.5 || (d > -22.5 && d < 22.5) || d > 337.5
}

/// Whether a vector is reported as reliable motion.
pub fn is_good(vector: &Vector, max_age: u32, max_friends: u32) -> bool {
    vector.age == max_age && vector.friends > max_friends
}

fn are_neighbors(a: &Vector, b: &Vector) -> bool {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy <= NEIGHBOR_DISTANCE_SQ
}

fn same_motion(a: &Vector, b: &Vector) -> bool {
    if !directions_agree(a.theta, b.theta) {
        return false;
    }
    let ratio = a.alpha / b.alpha;
    ratio > 0.75 && ratio < 1.25
}

/// Count the friends of every vector and classify them.
///
/// Friend counts are accumulated on top of the current `friends` values.
/// Both vectors of a matching pair are credited. A vector stops looking for
/// friends once it has more than the quorum, but can still be credited by
/// vectors scanned after it.
pub fn find_friends(vectors: &mut [Vector], max_age: u32) -> FriendStats {
    let n = vectors.len();
    let quorum = max_friends(n);

    for i in 0..n {
        if vectors[i].friends > quorum {
            continue;
        }

        let small = vectors[i].alpha < SMALL_MOVEMENT;
        for j in 0..n {
            if i == j || !are_neighbors(&vectors[i], &vectors[j]) {
                continue;
            }

            let matched = if small {
                vectors[j].alpha < SMALL_MOVEMENT
            } else {
                same_motion(&vectors[i], &vectors[j])
            };

            if matched {
                vectors[i].friends += 1;
                vectors[j].friends += 1;
                if vectors[i].friends > quorum {
                    break;
                }
            }
        }
    }

    let good_count = vectors
        .iter()
        .filter(|v| is_good(v, max_age, quorum))
        .count();

    FriendStats {
        max_friends: quorum,
        good_count,
    }
}
