pub mod v1 {
    use std::fmt;

    /// A Substreams package (`.spkg`).
    ///
    /// `modules` is kept as raw bytes. An embedded message and a `bytes` field share the
    /// same wire encoding, so the bytes can be forwarded verbatim in a stream request and
    /// inspected through [ModulesView] when needed.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Package {
        #[prost(uint64, tag = "5")]
        pub version: u64,
        #[prost(bytes = "vec", tag = "6")]
        pub modules: Vec<u8>,
        #[prost(string, tag = "9")]
        pub network: String,
    }

    /// Read-only view over `sf.substreams.v1.Modules`.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ModulesView {
        #[prost(message, repeated, tag = "1")]
        pub modules: Vec<ModuleView>,
    }

    /// Read-only view over `sf.substreams.v1.Module`.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ModuleView {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(oneof = "module_view::Kind", tags = "2, 3, 10")]
        pub kind: Option<module_view::Kind>,
        #[prost(uint64, tag = "8")]
        pub initial_block: u64,
    }

    pub mod module_view {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Kind {
            #[prost(message, tag = "2")]
            KindMap(KindMap),
            #[prost(message, tag = "3")]
            KindStore(KindStore),
            #[prost(message, tag = "10")]
            KindBlockIndex(KindBlockIndex),
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct KindMap {
            #[prost(string, tag = "1")]
            pub output_type: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct KindStore {
            #[prost(string, tag = "2")]
            pub value_type: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct KindBlockIndex {
            #[prost(string, tag = "1")]
            pub output_type: String,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Clock {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(uint64, tag = "2")]
        pub number: u64,
        #[prost(message, optional, tag = "3")]
        pub timestamp: Option<::prost_types::Timestamp>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockRef {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(uint64, tag = "2")]
        pub number: u64,
    }

    impl ModulesView {
        pub fn find(&self, name: &str) -> Option<&ModuleView> {
            self.modules.iter().find(|module| module.name == name)
        }
    }

    impl ModuleView {
        /// Returns the declared output type if this is a map module.
        pub fn map_output_type(&self) -> Option<&str> {
            match self.kind {
                Some(module_view::Kind::KindMap(ref kind)) => Some(kind.output_type.as_str()),
                _ => None,
            }
        }
    }

    impl fmt::Display for BlockRef {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "#{} ({})", self.number, self.id)
        }
    }
}

pub mod rpc {
    pub mod v2 {
        use std::fmt;

        use super::super::v1::{BlockRef, Clock};

        /// gRPC path of the server streaming `Blocks` method.
        pub const STREAM_BLOCKS_PATH: &str = "/sf.substreams.rpc.v2.Stream/Blocks";

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Request {
            #[prost(int64, tag = "1")]
            pub start_block_num: i64,
            #[prost(string, tag = "2")]
            pub start_cursor: String,
            #[prost(uint64, tag = "3")]
            pub stop_block_num: u64,
            #[prost(bool, tag = "4")]
            pub final_blocks_only: bool,
            #[prost(bool, tag = "5")]
            pub production_mode: bool,
            #[prost(string, tag = "6")]
            pub output_module: String,
            /// Encoded `sf.substreams.v1.Modules`, see [super::super::v1::Package].
            #[prost(bytes = "vec", tag = "7")]
            pub modules: Vec<u8>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Response {
            #[prost(oneof = "response::Message", tags = "1, 2, 3, 4, 5, 10, 11")]
            pub message: Option<response::Message>,
        }

        pub mod response {
            #[derive(Clone, PartialEq, ::prost::Oneof)]
            pub enum Message {
                #[prost(message, tag = "1")]
                Session(super::SessionInit),
                #[prost(message, tag = "2")]
                Progress(super::ModulesProgress),
                #[prost(message, tag = "3")]
                BlockScopedData(super::BlockScopedData),
                #[prost(message, tag = "4")]
                BlockUndoSignal(super::BlockUndoSignal),
                #[prost(message, tag = "5")]
                FatalError(super::Error),
                #[prost(message, tag = "10")]
                DebugSnapshotData(super::InitialSnapshotData),
                #[prost(message, tag = "11")]
                DebugSnapshotComplete(super::InitialSnapshotComplete),
            }
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct SessionInit {
            #[prost(string, tag = "1")]
            pub trace_id: String,
            #[prost(uint64, tag = "2")]
            pub resolved_start_block: u64,
            #[prost(uint64, tag = "3")]
            pub linear_handoff_block: u64,
            #[prost(uint64, tag = "4")]
            pub max_parallel_workers: u64,
        }

        /// Backfill progress. The content is not used by the sink.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ModulesProgress {}

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct InitialSnapshotData {}

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct InitialSnapshotComplete {}

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct BlockScopedData {
            #[prost(message, optional, tag = "1")]
            pub output: Option<MapModuleOutput>,
            #[prost(message, optional, tag = "2")]
            pub clock: Option<Clock>,
            #[prost(string, tag = "3")]
            pub cursor: String,
            #[prost(uint64, tag = "4")]
            pub final_block_height: u64,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct MapModuleOutput {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(message, optional, tag = "2")]
            pub map_output: Option<::prost_types::Any>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct BlockUndoSignal {
            #[prost(message, optional, tag = "1")]
            pub last_valid_block: Option<BlockRef>,
            #[prost(string, tag = "2")]
            pub last_valid_cursor: String,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Error {
            #[prost(string, tag = "1")]
            pub module: String,
            #[prost(string, tag = "2")]
            pub reason: String,
            #[prost(string, repeated, tag = "3")]
            pub logs: Vec<String>,
            #[prost(bool, tag = "4")]
            pub logs_truncated: bool,
        }

        impl fmt::Display for Error {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.module.is_empty() {
                    write!(f, "{}", self.reason)
                } else {
                    write!(f, "module {}: {}", self.module, self.reason)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use prost::Message;

    use super::rpc::v2::{response, BlockScopedData, Request, Response};
    use super::v1::{module_view, ModuleView, ModulesView, Package};

    /// Same layout as [Package] but with the modules declared as a message.
    #[derive(Clone, PartialEq, ::prost::Message)]
    struct TypedPackage {
        #[prost(uint64, tag = "5")]
        version: u64,
        #[prost(message, optional, tag = "6")]
        modules: Option<ModulesView>,
    }

    /// Same layout as [Request] but with the modules declared as a message.
    #[derive(Clone, PartialEq, ::prost::Message)]
    struct TypedRequest {
        #[prost(string, tag = "6")]
        output_module: String,
        #[prost(message, optional, tag = "7")]
        modules: Option<ModulesView>,
    }

    fn new_modules() -> ModulesView {
        ModulesView {
            modules: vec![
                ModuleView {
                    name: "map_my_data".to_string(),
                    kind: Some(module_view::Kind::KindMap(module_view::KindMap {
                        output_type: "proto:mydata.v1.PriceUpdate".to_string(),
                    })),
                    initial_block: 335_420_000,
                },
                ModuleView {
                    name: "store_prices".to_string(),
                    kind: Some(module_view::Kind::KindStore(module_view::KindStore {
                        value_type: "float64".to_string(),
                    })),
                    initial_block: 0,
                },
            ],
        }
    }

    #[test]
    fn test_package_modules_are_forwarded_verbatim() {
        let typed = TypedPackage {
            version: 1,
            modules: Some(new_modules()),
        };
        let package = Package::decode(typed.encode_to_vec().as_slice()).unwrap();
        assert_eq!(package.version, 1);

        let modules = ModulesView::decode(package.modules.as_slice()).unwrap();
        let module = modules.find("map_my_data").unwrap();
        assert_eq!(module.map_output_type(), Some("proto:mydata.v1.PriceUpdate"));
        assert_eq!(module.initial_block, 335_420_000);
        assert_eq!(modules.find("store_prices").unwrap().map_output_type(), None);
        assert!(modules.find("missing").is_none());

        let request = Request {
            output_module: "map_my_data".to_string(),
            modules: package.modules.clone(),
            ..Request::default()
        };
        let on_the_wire = TypedRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(on_the_wire.modules, Some(new_modules()));
    }

    #[test]
    fn test_response_skips_unknown_fields() {
        let response = Response {
            message: Some(response::Message::BlockScopedData(BlockScopedData {
                cursor: "abc".to_string(),
                final_block_height: 10,
                ..BlockScopedData::default()
            })),
        };
        let mut bytes = response.encode_to_vec();
        // Append an unknown varint field (tag 99).
        prost::encoding::uint64::encode(99, &42, &mut bytes);

        let decoded = Response::decode(bytes.as_slice()).unwrap();
        assert_matches!(decoded.message, Some(response::Message::BlockScopedData(data)) => {
            assert_eq!(data.cursor, "abc");
            assert_eq!(data.final_block_height, 10);
        });
    }
}
