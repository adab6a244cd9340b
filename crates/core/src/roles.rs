use crate::error::HarvestError;
use crate::model::InstanceHandle;

/// One harvester and the upstream data provider it is assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvesterRole {
    pub instance_id: String,
    pub ip: String,
    pub label: String,
}

/// Harvesters in label order: entry `n` carries `labels[n]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleAssignment {
    pub harvesters: Vec<HarvesterRole>,
}

/// Pair every non-main instance with one provider label.
///
/// The main instance is skipped by id wherever it appears. Remaining
/// instances are ordered by their launch index tag when all of them carry
/// one, otherwise the provider's reported order is used as is. The number of
/// harvesters must match the number of labels exactly.
pub fn assign_roles(
    instances: &[InstanceHandle],
    main: &InstanceHandle,
    labels: &[String],
) -> Result<RoleAssignment, HarvestError> {
    let mut candidates: Vec<&InstanceHandle> =
        instances.iter().filter(|i| i.id != main.id).collect();

    if candidates.iter().all(|i| i.harvester_index().is_some()) {
        candidates.sort_by_key(|i| i.harvester_index());
    }

    if candidates.len() != labels.len() {
        return Err(HarvestError::Assignment(format!(
            "{} provider labels but {} harvester instances",
            labels.len(),
            candidates.len()
        )));
    }

    let harvesters = candidates
        .into_iter()
        .zip(labels)
        .map(|(instance, label)| {
            let ip = instance.ip.clone().ok_or_else(|| {
                HarvestError::Assignment(format!("instance {} has no IP address", instance.id))
            })?;
            Ok(HarvesterRole {
                instance_id: instance.id.clone(),
                ip,
                label: label.clone(),
            })
        })
        .collect::<Result<Vec<_>, HarvestError>>()?;

    Ok(RoleAssignment { harvesters })
}
