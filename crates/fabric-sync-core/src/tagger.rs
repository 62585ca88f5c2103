//! Ownership tagging
//!
//! Every object fabric-sync creates carries a reference to one well-known
//! `label=<value>` tag. Reconciliation never deletes or mutates an object
//! without it, however stale the object looks.

use tracing::{debug, info};

use crate::error::Result;
use crate::identity::make_id;
use crate::model::{FabricObject, FqName, ObjectRef, Tag, Taggable};
use crate::traits::FabricRepository;

/// Tag type used for ownership and port labels
pub const LABEL_TAG_TYPE: &str = "label";

/// The ownership tag as it exists in the fabric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTag {
    tag: Tag,
}

impl OwnershipTag {
    pub fn new(tag: Tag) -> Self {
        Self { tag }
    }

    /// fq_name of the label tag for `value`
    pub fn fq_name_for(value: &str) -> FqName {
        vec![label(value)]
    }

    /// Tag object for `value` with a deterministic uuid
    pub fn tag_for(value: &str) -> Tag {
        let name = label(value);
        Tag {
            uuid: make_id(&name),
            fq_name: vec![name],
            tag_type_name: LABEL_TAG_TYPE.to_string(),
            tag_value: value.to_string(),
        }
    }

    /// Read the ownership tag, creating it first if the fabric lacks it
    pub async fn ensure(repo: &dyn FabricRepository, value: &str) -> Result<Self> {
        let fq_name = Self::fq_name_for(value);
        if let Some(tag) = repo.read_tag(&fq_name).await? {
            debug!("Ownership tag {} found ({})", tag.name(), tag.uuid);
            return Ok(Self::new(tag));
        }

        let tag = Self::tag_for(value);
        match repo.create_tag(&tag).await {
            Ok(()) => {
                info!("Created ownership tag {}", tag.name());
                Ok(Self::new(tag))
            }
            Err(e) if e.is_already_exists() => {
                // Another writer created it between our read and create
                let tag = repo
                    .read_tag(&fq_name)
                    .await?
                    .unwrap_or_else(|| Self::tag_for(value));
                Ok(Self::new(tag))
            }
            Err(e) => Err(e),
        }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn reference(&self) -> ObjectRef {
        self.tag.to_ref()
    }

    /// Attach the ownership tag; a no-op when already attached
    pub fn assign<T: Taggable>(&self, object: &mut T) {
        if !self.belongs_to_system(object) {
            object.tag_refs_mut().push(self.reference());
        }
    }

    /// Whether `object` was created by this system
    pub fn belongs_to_system<T: Taggable + ?Sized>(&self, object: &T) -> bool {
        object
            .tag_refs()
            .iter()
            .any(|r| r.last_name() == Some(self.tag.name()))
    }
}

/// Whether `refs` include the `label=<value>` tag
pub fn has_label(refs: &[ObjectRef], value: &str) -> bool {
    let wanted = label(value);
    refs.iter().any(|r| r.last_name() == Some(wanted.as_str()))
}

/// Whether `refs` include any of the given `type=value` tag names
pub fn has_any_tag(refs: &[ObjectRef], tag_names: &[String]) -> bool {
    refs.iter()
        .filter_map(ObjectRef::last_name)
        .any(|name| tag_names.iter().any(|t| t == name))
}

fn label(value: &str) -> String {
    format!("{}={}", LABEL_TAG_TYPE, value)
}
