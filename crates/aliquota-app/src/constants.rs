//! Cross-cutting application constants.

/// File name of the downloaded table archive inside the data directory.
pub const ARTIFACT_FILE: &str = "tabela_aliquotas_ibpt.zip";

/// File name of the persisted version record. The `.txt` extension is kept
/// for compatibility with records written by earlier deployments.
pub const VERSION_RECORD_FILE: &str = "last_version_downloaded.txt";

/// File name of the broadcast destination registry.
pub const GROUPS_FILE: &str = "grupos.json";
