//! The five capability interfaces consumed by the capture core
//! (spec.md §6): pod registry, namespace resolver, packet source, TLS
//! event source, and ingestion client. The core treats these as leaf
//! collaborators; their real implementations (Kubernetes API client,
//! container-runtime client, packet/TLS parsers, eBPF uprobe loader,
//! ingestion HTTP client) are out of scope per spec.md §1.
//!
//! Each trait follows the same shape: an async trait with a boxed
//! stream return and a `snafu` error enum, plus a hand-rolled in-memory
//! mock for tests.

pub mod ingestion_client;
pub mod namespace_resolver;
pub mod packet_source;
pub mod pod_registry;
pub mod tls_event_source;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use ingestion_client::{DynamicAgentConfig, IngestionClient, IngestionError, UploadError};
pub use namespace_resolver::{NamespaceResolver, NamespaceResolverError};
pub use packet_source::{PacketSource, PacketSourceError, ParsedNetworkTraffic};
pub use pod_registry::{OwnerReference, Phase, PodEvent, PodRegistry, PodRegistryError, PodSnapshot, PodUid};
pub use tls_event_source::{SocketResolver, SocketResolverError, SslEvent, TlsEventSource, TlsEventSourceError};
