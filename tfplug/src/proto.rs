//! Protocol buffer types for Terraform Plugin Protocol v6
//!
//! Generated at build time by tonic_build from proto/tfplugin6.proto. Request
//! and response messages live in snake_case modules named after their RPC
//! (`read_resource::Request`), nested enums in the module of their message
//! (`diagnostic::Severity`).
//!
//! Several messages share names with framework types, so refer to these
//! through the `proto::` prefix.

// Include the generated protobuf code from the build output directory
// The file name is based on the proto package name (tfplugin6)
include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));

// Re-export the gRPC service trait and server
pub use provider_server::{Provider as ProviderService, ProviderServer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_enum_values_match_the_protocol() {
        assert_eq!(diagnostic::Severity::Invalid as i32, 0);
        assert_eq!(diagnostic::Severity::Error as i32, 1);
        assert_eq!(diagnostic::Severity::Warning as i32, 2);
        assert_eq!(StringKind::Markdown as i32, 1);
        assert_eq!(schema::nested_block::NestingMode::List as i32, 2);
    }
}
