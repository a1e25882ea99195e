//! `kubectl api-resources` parsing and resource-type lookup.
//!
//! kubectl prints a fixed-width table whose layout changed over time:
//! older clients report an `APIGROUP` column, newer ones `APIVERSION`
//! (`apps/v1`). Columns are located by the start offset of their header.

use crate::error::{Error, Result};
use crate::types::{ApiResource, ResourceRef, split_api_version};

/// Resource types that are never deployed from manifests.
pub const DENY_LIST: &[&str] = &[
    "bindings",
    "certificatesigningrequests",
    "componentstatuses",
    "controllerrevisions",
    "csinodes",
    "endpoints",
    "events",
    "localsubjectaccessreviews",
    "nodes",
    "selfsubjectaccessreviews",
    "selfsubjectrulesreviews",
    "subjectaccessreviews",
    "tokenreviews",
    "volumeattachments",
];

/// Parse the text table printed by `kubectl api-resources`.
///
/// Rows without a `NAME` are skipped. A table without a header yields an
/// empty list.
pub fn parse_table(text: &str) -> Result<Vec<ApiResource>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns = Columns::from_header(header);

    if columns.position("NAME").is_none() || columns.position("KIND").is_none() {
        return Err(Error::Manifest(format!(
            "unexpected api-resources header: {}",
            header.trim()
        )));
    }

    let mut resources = Vec::new();
    for line in lines {
        let name = columns.field(line, "NAME").unwrap_or_default();
        if name.is_empty() {
            continue;
        }

        let (group, version) = if let Some(api_version) = columns.field(line, "APIVERSION") {
            let (g, v) = split_api_version(api_version);
            (g.to_string(), v.to_string())
        } else {
            let group = columns.field(line, "APIGROUP").unwrap_or_default();
            (group.to_string(), String::new())
        };

        resources.push(ApiResource {
            name: name.to_string(),
            group,
            version,
            kind: columns.field(line, "KIND").unwrap_or_default().to_string(),
            namespaced: columns.field(line, "NAMESPACED") == Some("true"),
        });
    }

    Ok(resources)
}

/// Drop resource types that are never deployed.
pub fn filter_deployable(resources: Vec<ApiResource>) -> Vec<ApiResource> {
    resources
        .into_iter()
        .filter(|r| !DENY_LIST.contains(&r.name.as_str()))
        .collect()
}

/// Header columns with their start offsets.
struct Columns<'a> {
    names: Vec<(&'a str, usize)>,
}

impl<'a> Columns<'a> {
    fn from_header(header: &'a str) -> Self {
        let mut names = Vec::new();
        let mut start = None;
        for (i, c) in header.char_indices() {
            match (c.is_whitespace(), start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    names.push((&header[s..i], s));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            names.push((&header[s..], s));
        }
        Self { names }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|(n, _)| *n == name)
    }

    /// Trimmed cell of `line` under column `name`; `None` if the column is absent.
    fn field<'l>(&self, line: &'l str, name: &str) -> Option<&'l str> {
        let index = self.position(name)?;
        let start = self.names[index].1;
        let end = self.names.get(index + 1).map_or(line.len(), |(_, s)| *s);
        let cell = line.get(start.min(line.len())..end.min(line.len()))?;
        Some(cell.trim())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Deployable resource types of one cluster, searchable by group and kind.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resources: Vec<ApiResource>,
}

impl Catalog {
    /// Build a catalog from deployable resource types.
    pub fn new(resources: Vec<ApiResource>) -> Self {
        Self { resources }
    }

    /// All resource types in the catalog.
    pub fn resources(&self) -> &[ApiResource] {
        &self.resources
    }

    /// Find the resource type serving `kind` in `group`.
    pub fn lookup(&self, group: &str, kind: &str) -> Option<&ApiResource> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.group == group)
    }

    /// Name kubectl accepts for the type of `r`, e.g. `deployments.apps`.
    pub fn type_name(&self, r: &ResourceRef) -> Option<String> {
        self.lookup(&r.group, &r.kind).map(ApiResource::type_name)
    }

    /// Whether the type of `r` is namespaced; `None` if unknown.
    pub fn is_namespaced(&self, r: &ResourceRef) -> Option<bool> {
        self.lookup(&r.group, &r.kind).map(|a| a.namespaced)
    }
}
