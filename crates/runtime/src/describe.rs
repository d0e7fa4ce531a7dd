//! Resolving a variable's (type, rank, shape) from the model.
//!
//! The resolver does not check whether a name exists; it reports whatever the
//! model writes. Models typically leave every output untouched for names they
//! do not know, which comes back as an empty type tag and an all-zero shape:
//! an absent variable, not an error.

use bmi_core::{BmiError, CName, ElementType, Result, VariableDescriptor, MAXDIMS};
use tracing::{debug, warn};

use crate::api::BmiApi;

/// Query type, rank and shape of `name`.
///
/// Fails with `UnknownType` for a non-empty tag outside the lookup table and
/// with `InvalidDescriptor` for a negative or oversized rank or a negative
/// extent. Non-zero entries past `rank` are logged and cleared.
pub fn describe(api: &BmiApi, name: &str) -> Result<VariableDescriptor> {
    let c_name = CName::new(name)?;

    let tag = api.var_type(&c_name);
    let element_type = if tag.is_empty() {
        None
    } else {
        Some(
            ElementType::from_tag(&tag).ok_or_else(|| BmiError::UnknownType {
                variable: name.to_string(),
                tag: tag.clone(),
            })?,
        )
    };

    let raw_rank = api.var_rank(&c_name);
    let rank = usize::try_from(raw_rank)
        .ok()
        .filter(|&r| r <= MAXDIMS)
        .ok_or_else(|| {
            BmiError::invalid_descriptor(
                name,
                format!("rank {} outside 0..={}", raw_rank, MAXDIMS),
            )
        })?;

    let raw_shape = api.var_shape(&c_name);
    let mut shape = [0usize; MAXDIMS];
    for (axis, (&extent, slot)) in raw_shape.iter().zip(shape.iter_mut()).enumerate().take(rank) {
        *slot = usize::try_from(extent).map_err(|_| {
            BmiError::invalid_descriptor(
                name,
                format!("negative extent {} on axis {}", extent, axis),
            )
        })?;
    }
    if raw_shape[rank..].iter().any(|&extent| extent != 0) {
        warn!(
            variable = name,
            rank,
            shape = ?raw_shape,
            "Model reported extents beyond rank; ignoring them"
        );
    }

    let descriptor = VariableDescriptor {
        name: name.to_string(),
        element_type,
        rank,
        shape,
    };
    debug!(
        variable = name,
        element_type = %tag,
        rank,
        dims = ?descriptor.dims(),
        "Resolved variable descriptor"
    );
    Ok(descriptor)
}
