//! Model registry protocol
//!
//! A model moves through `UNSAVED -> SAVED -> REGISTERED -> ALIASED -> LOADED`:
//! a [`Saver`] writes the bundle under a run, a [`Register`] records it as the
//! next version of a name, an alias points at one version, and a [`Loader`]
//! resolves any URI form back to a bound [`Adapter`].

pub mod loader;
pub mod register;
pub mod saver;
pub mod store;
pub mod uri;

pub use loader::{Adapter, CustomLoader, Loader, LoaderKind};
pub use register::{Register, RegisterKind, StoreRegister};
pub use saver::{CustomSaver, Info, ModelManifest, Saver, SaverKind};
pub use store::{ArtifactStore, LocalTrackingStore, ModelRegistry, ModelVersion, Stage};
pub use uri::{
    uri_for_model_alias, uri_for_model_alias_or_version, uri_for_model_version,
    uri_for_run_artifact, AliasOrVersion, ModelUri,
};
