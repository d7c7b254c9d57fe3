//! Constants shared across the crate.

/// Magic bytes at the start of every persisted build graph.
pub const BUILD_GRAPH_MAGIC: &[u8; 4] = b"KEBG";

/// Version of the persisted build graph format.
///
/// Bump whenever the layout written by any `Persistent` implementation changes.
pub const FORMAT_VERSION: u32 = 3;

/// File extension of persisted build graphs (without the dot).
pub const BUILD_GRAPH_FILE_EXTENSION: &str = "bg";

/// Namespace in the build configuration that carries the build identity.
pub const BUILD_CONFIG_NAMESPACE: &str = "keel";

/// Key of the profile name inside [`BUILD_CONFIG_NAMESPACE`].
pub const BUILD_CONFIG_PROFILE_KEY: &str = "profile";

/// Key of the build variant inside [`BUILD_CONFIG_NAMESPACE`].
pub const BUILD_CONFIG_VARIANT_KEY: &str = "buildVariant";

/// Key of the per-module configuration inside a product's property map.
pub const MODULES_PROPERTY_KEY: &str = "modules";
