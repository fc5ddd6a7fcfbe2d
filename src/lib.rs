mod config;
mod create;
mod debounce;
mod error;
mod fields;
mod frontmatter;
mod index;
mod link_resolve;
mod links;
mod panel;
mod relations;
mod service;
mod taxonomy;
mod vault;

pub use crate::config::{DEFAULT_ATTACHMENT_KEY, FolderTemplate, Settings, VaultConfig};
pub use crate::create::{
    CreateOptions, DEFAULT_PRIORITY, DEFAULT_STATUS, FolderTemplates, TemplateHook,
    TemplateTarget, create_attached_note,
};
pub use crate::debounce::Debouncer;
pub use crate::error::{Error, Result};
pub use crate::fields::{FieldMap, FieldValue};
pub use crate::frontmatter::{Frontmatter, process_frontmatter, render_note};
pub use crate::index::{FrontmatterStatus, NoteMeta, VaultIndex};
pub use crate::link_resolve::{LinkResolver, ResolveResult};
pub use crate::links::{
    LinkToken, WikiLink, find_wikilink, matches_back, parse_link_field, parse_wikilink,
    wikilink_to,
};
pub use crate::panel::{
    Badge, Panel, PanelItem, ParentLink, ViewMode, build_panel, display_title, property_options,
};
pub use crate::relations::{AttachedNote, Relationships, attach_note, detach_note, locale_cmp};
pub use crate::service::{ReindexCause, VaultEvent, VaultService, ViewId, WatchKind};
pub use crate::taxonomy::{
    DepthPolicy, FolderTree, TypeIcon, TypeRecord, TypeTaxonomy, search_types, type_icon,
};
pub use crate::vault::{Entry, Vault, VaultPath};
