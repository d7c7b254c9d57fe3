//! The resolved project model.
//!
//! Products, groups, rules and modules as they come out of resolution, plus the
//! project tree holding them. Lazily computed data (rule order, wildcard matches,
//! environments) is cached on the owning object the first time it is asked for.

mod artifact;
mod group;
mod location;
mod module;
mod product;
mod project;
mod property;
mod rule;

pub use artifact::{FileTagger, SourceArtifact, SourceWildCards};
pub use group::Group;
pub use location::{CodeLocation, FileTags, file_tags};
pub use module::{Module, ScriptImport};
pub use product::{ArtifactProperties, Product};
pub use project::{Project, ProjectBuildData, ProjectError, ProjectId, TopLevelProject};
pub use property::{PropertyError, PropertyMap, PropertyValue};
pub use rule::{PrepareScript, Rule, RuleArtifact, RuleArtifactBinding};
