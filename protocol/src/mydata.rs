pub mod v1 {
    use crate::MessageType;

    /// Output of the price map module.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PriceUpdate {
        #[prost(string, tag = "1")]
        pub pair_address: String,
        #[prost(string, tag = "2")]
        pub token0: String,
        #[prost(string, tag = "3")]
        pub token1: String,
        #[prost(double, tag = "4")]
        pub price_usd: f64,
        #[prost(double, tag = "5")]
        pub volume_usd: f64,
        #[prost(uint64, tag = "6")]
        pub block_number: u64,
        #[prost(uint64, tag = "7")]
        pub timestamp: u64,
    }

    impl MessageType for PriceUpdate {
        const TYPE_NAME: &'static str = "mydata.v1.PriceUpdate";
    }
}
