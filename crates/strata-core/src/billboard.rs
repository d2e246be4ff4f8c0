//! # Billboards
//!
//! Rotation turning a subtree to face the traversal's camera. The rotated
//! frame's +Y axis points at the camera and its `up` axis stays as close to
//! the requested up vector as possible; an axial billboard only turns about
//! `up`.

use crate::arc_chain::ArcChain;
use crate::graph::SceneGraph;
use crate::transition::BillboardParams;
use crate::wrapper::TransformWrapper;
use crate::{ArcId, NodeId, StrataError};
use glam::{Mat4, Vec3, Vec4};

/// Rotation facing `camera_pos`, given in the billboard's own frame.
///
/// Degenerate inputs (camera at the origin, or on the up axis of an axial
/// billboard) yield the identity.
#[must_use]
pub fn rotation(camera_pos: Vec3, params: &BillboardParams) -> Mat4 {
    let Some(up) = params.up.try_normalize() else {
        return Mat4::IDENTITY;
    };
    let toward = if params.axial {
        camera_pos - up * camera_pos.dot(up)
    } else {
        camera_pos
    };
    let Some(forward) = toward.try_normalize() else {
        return Mat4::IDENTITY;
    };
    let Some(right) = forward.cross(up).try_normalize() else {
        return Mat4::IDENTITY;
    };
    let new_up = right.cross(forward);
    Mat4::from_cols(
        right.extend(0.0),
        forward.extend(0.0),
        new_up.extend(0.0),
        Vec4::W,
    )
}

/// Rotation for the billboard on `arc`, seen from `camera`.
///
/// `chain` is the traversal path ending at `arc`; it picks the instance of
/// the arc's child the camera is looking at.
pub fn billboard_rotation(
    graph: &SceneGraph,
    camera: NodeId,
    arc: ArcId,
    chain: &ArcChain,
    params: &BillboardParams,
) -> Result<Mat4, StrataError> {
    let data = graph.arc(arc)?;
    let rel: TransformWrapper = graph.wrt(camera, &[], data.child(), &chain.to_vec(), data.graph_type())?;
    Ok(rotation(rel.matrix().w_axis.truncate(), params))
}

// =============================================================================
// TESTS
// =============================================================================
