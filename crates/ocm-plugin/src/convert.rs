//! Conversion between canonical descriptor shapes and wire DTOs.

use chrono::{DateTime, SecondsFormat, Utc};
use ocm_runtime::{Digest, ElementMeta, Label, Resource, ResourceRelation, SourceRef};

use crate::error::{PluginError, PluginResult};
use crate::wire::{DigestDto, LabelDto, ResourceDto, SourceRefDto};

fn label_to_wire(label: &Label) -> LabelDto {
    LabelDto {
        name: label.name.clone(),
        value: label.value.clone(),
        version: label.version.clone(),
        signing: label.signing,
    }
}

fn label_from_wire(label: &LabelDto) -> Label {
    Label {
        name: label.name.clone(),
        value: label.value.clone(),
        version: label.version.clone(),
        signing: label.signing,
    }
}

fn digest_to_wire(digest: &Digest) -> DigestDto {
    DigestDto {
        hash_algorithm: digest.hash_algorithm.clone(),
        normalisation_algorithm: digest.normalisation_algorithm.clone(),
        value: digest.value.clone(),
    }
}

fn digest_from_wire(digest: &DigestDto) -> Digest {
    Digest {
        hash_algorithm: digest.hash_algorithm.clone(),
        normalisation_algorithm: digest.normalisation_algorithm.clone(),
        value: digest.value.clone(),
    }
}

/// Canonical resource to its wire form.
#[must_use]
pub fn resource_to_wire(resource: &Resource) -> ResourceDto {
    ResourceDto {
        name: resource.meta.name.clone(),
        version: resource.meta.version.clone(),
        extra_identity: resource.meta.extra_identity.clone(),
        labels: resource.meta.labels.iter().map(label_to_wire).collect(),
        src_refs: resource
            .source_refs
            .iter()
            .map(|r| SourceRefDto {
                identity_selector: r.identity_selector.clone(),
                labels: r.labels.iter().map(label_to_wire).collect(),
            })
            .collect(),
        typ: resource.typ.clone(),
        relation: resource.relation.as_str().to_string(),
        access: resource.access.clone(),
        digest: resource.digest.as_ref().map(digest_to_wire),
        size: resource.size,
        creation_time: resource
            .creation_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    }
}

/// Wire resource to its canonical form.
///
/// # Errors
///
/// Returns [`PluginError::Conversion`] for an unknown relation or a
/// creation time that is not RFC 3339.
pub fn resource_from_wire(dto: &ResourceDto) -> PluginResult<Resource> {
    let relation = ResourceRelation::parse(&dto.relation).ok_or_else(|| {
        PluginError::Conversion(format!(
            "resource {}: unknown relation {:?}",
            dto.name, dto.relation
        ))
    })?;

    let creation_time = dto
        .creation_time
        .as_deref()
        .map(|t| {
            DateTime::parse_from_rfc3339(t)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    PluginError::Conversion(format!(
                        "resource {}: invalid creation time {t:?}: {e}",
                        dto.name
                    ))
                })
        })
        .transpose()?;

    Ok(Resource {
        meta: ElementMeta {
            name: dto.name.clone(),
            version: dto.version.clone(),
            labels: dto.labels.iter().map(label_from_wire).collect(),
            extra_identity: dto.extra_identity.clone(),
        },
        typ: dto.typ.clone(),
        relation,
        source_refs: dto
            .src_refs
            .iter()
            .map(|r| SourceRef {
                identity_selector: r.identity_selector.clone(),
                labels: r.labels.iter().map(label_from_wire).collect(),
            })
            .collect(),
        access: dto.access.clone(),
        digest: dto.digest.as_ref().map(digest_from_wire),
        size: dto.size,
        creation_time,
    })
}
