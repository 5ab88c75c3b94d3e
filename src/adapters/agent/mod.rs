pub mod primary;
pub mod router;
pub mod secondary;

pub use primary::PrimaryAgentAdapter;
pub use router::DualAgentAdapter;
pub use secondary::SecondaryAgentAdapter;

/// Tools configured for every stage, on both back-ends (spec §6).
pub const ALLOWED_TOOLS: &[&str] =
    &["read-any-file", "write-file", "edit-file", "execute-shell", "glob", "grep", "todo-write"];
