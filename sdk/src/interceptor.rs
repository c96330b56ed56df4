use tonic::{
    metadata::{AsciiMetadataValue, KeyAndValueRef},
    service::Interceptor,
};

pub use tonic::metadata::{errors::InvalidMetadataValue, MetadataMap};

/// A metadata key.
pub type MetadataKey = tonic::metadata::MetadataKey<tonic::metadata::Ascii>;
/// A metadata value.
pub type MetadataValue = tonic::metadata::MetadataValue<tonic::metadata::Ascii>;

pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Adds the configured metadata, including the bearer token, to every request.
#[derive(Default, Clone)]
pub struct MetadataInterceptor {
    metadata: MetadataMap,
}

impl MetadataInterceptor {
    pub fn with_metadata(metadata: MetadataMap) -> Self {
        Self { metadata }
    }

    pub fn insert_bearer_token(
        &mut self,
        token: &str,
    ) -> Result<Option<MetadataValue>, InvalidMetadataValue> {
        let token = AsciiMetadataValue::try_from(format!("Bearer {token}"))?;
        Ok(self.metadata.insert(AUTHORIZATION_HEADER, token))
    }
}

impl Interceptor for MetadataInterceptor {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> Result<tonic::Request<()>, tonic::Status> {
        let req_meta = request.metadata_mut();

        for kv in self.metadata.iter() {
            match kv {
                KeyAndValueRef::Ascii(key, value) => {
                    req_meta.insert(key, value.clone());
                }
                KeyAndValueRef::Binary(key, value) => {
                    req_meta.insert_bin(key, value.clone());
                }
            }
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use tonic::service::Interceptor;

    use super::{MetadataInterceptor, MetadataKey, MetadataMap, AUTHORIZATION_HEADER};

    #[test]
    fn test_bearer_token_and_metadata_are_added() {
        let mut metadata = MetadataMap::new();
        let key: MetadataKey = "x-sink-id".parse().unwrap();
        metadata.insert(key, "price-sink".parse().unwrap());

        let mut interceptor = MetadataInterceptor::with_metadata(metadata);
        interceptor.insert_bearer_token("secret").unwrap();

        let request = interceptor.call(tonic::Request::new(())).unwrap();
        let meta = request.metadata();
        assert_eq!(
            meta.get(AUTHORIZATION_HEADER).unwrap().to_str().unwrap(),
            "Bearer secret"
        );
        assert_eq!(
            meta.get("x-sink-id").unwrap().to_str().unwrap(),
            "price-sink"
        );
    }

    #[test]
    fn test_invalid_bearer_token() {
        let mut interceptor = MetadataInterceptor::default();
        assert!(interceptor.insert_bearer_token("bad\ntoken").is_err());
    }
}
