//! Per-family node statistics.
//!
//! A node's mutable, algorithm-specific state is one `Stat` variant rather
//! than a trait object: the families share little behaviour beyond "select a
//! child" and "absorb a backup", and a closed, tagged enum keeps that
//! dispatch a match rather than a vtable, at the cost of the families all
//! living in one crate (true here: there is no plugin boundary to support).

pub mod ball;
pub mod hmcts;
pub mod hull;
pub mod ments;
pub mod simplex;
pub mod uct;

use ball::BallListStat;
use hmcts::HmctsStat;
use hull::HullStat;
use ments::MentsStat;
use simplex::SimplexStat;
use uct::UctStat;

/// The algorithm-specific state carried by one D-node or C-node.
#[derive(Debug, Clone)]
pub enum Stat {
    Uct(UctStat),
    Ments(MentsStat),
    Ball(BallListStat),
    Hull(HullStat),
    Simplex(SimplexStat),
    Hmcts(HmctsStat),
}

impl Stat {
    pub fn as_uct(&self) -> Option<&UctStat> {
        match self {
            Stat::Uct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uct_mut(&mut self) -> Option<&mut UctStat> {
        match self {
            Stat::Uct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ments(&self) -> Option<&MentsStat> {
        match self {
            Stat::Ments(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ments_mut(&mut self) -> Option<&mut MentsStat> {
        match self {
            Stat::Ments(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ball_mut(&mut self) -> Option<&mut BallListStat> {
        match self {
            Stat::Ball(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hull_mut(&mut self) -> Option<&mut HullStat> {
        match self {
            Stat::Hull(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_simplex_mut(&mut self) -> Option<&mut SimplexStat> {
        match self {
            Stat::Simplex(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hmcts_mut(&mut self) -> Option<&mut HmctsStat> {
        match self {
            Stat::Hmcts(s) => Some(s),
            _ => None,
        }
    }
}
