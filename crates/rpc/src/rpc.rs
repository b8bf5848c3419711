use hyper::{http::HeaderValue, Method};
use jsonrpsee::{
    server::{Server, ServerHandle},
    Methods,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// JsonRpcServer is a wrapper around the `jsonrpsee` HTTP [Server].
pub struct JsonRpcServer {
    /// The address to listen on.
    listen_address: String,
    /// The [cors layer](CorsLayer) to filter requests.
    cors_layer: Option<CorsLayer>,
    /// The RPC methods to be exposed.
    methods: Methods,
}

impl JsonRpcServer {
    pub fn new(listen_address: String) -> Self {
        Self { listen_address, cors_layer: None, methods: Methods::new() }
    }

    /// Add a cors layer to the server.
    ///
    /// `*` allows any origin; other entries that are not valid header values are ignored.
    pub fn with_cors(mut self, cors_domain: Vec<String>) -> Self {
        let cors_layer = if cors_domain.iter().any(|d| d == "*") {
            CorsLayer::new().allow_headers(Any).allow_methods([Method::POST]).allow_origin(Any)
        } else {
            let mut origins: Vec<HeaderValue> = vec![];

            for domain in cors_domain.iter() {
                if let Ok(origin) = domain.parse::<HeaderValue>() {
                    origins.push(origin);
                }
            }

            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::POST])
                .allow_origin(AllowOrigin::list(origins))
        };

        self.cors_layer = Some(cors_layer);
        self
    }

    /// Add methods to the RPC server.
    pub fn add_methods(&mut self, methods: impl Into<Methods>) -> eyre::Result<()> {
        self.methods.merge(methods)?;
        Ok(())
    }

    /// Start the [json RPC server](JsonRpcServer)
    ///
    /// Returns the handle of the server together with the address it is bound to.
    pub async fn start(&self) -> eyre::Result<(ServerHandle, SocketAddr)> {
        let service = ServiceBuilder::new().option_layer(self.cors_layer.clone());

        let server = Server::builder()
            .http_only()
            .set_http_middleware(service)
            .build(&self.listen_address)
            .await?;
        let local_addr = server.local_addr()?;

        Ok((server.start(self.methods.clone()), local_addr))
    }
}
