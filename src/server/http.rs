use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use axum_server::accept::{Accept, DefaultAcceptor};
use axum_server::service::{MakeService, SendService};
use axum_server::tls_openssl::{OpenSSLAcceptor, OpenSSLConfig};
use axum_server::{Handle, Server};
use camino::Utf8Path;
use hyper::body::Incoming;
use openssl::ssl::{AlpnError, SslAcceptor, SslFiletype, SslMethod, SslRef};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::ApiResult;
use crate::server::service::Service;

pub struct HttpServer<S, A, E = ()> {
    addr: SocketAddr,
    bind: fn(&Self) -> Server<A>,
    svc: S,
    extra: E,
    handle: Handle,
}

#[async_trait]
impl<S, A, E> Service for HttpServer<S, A, E>
where
    E: Send + 'static,
    S: Send + Clone + MakeService<SocketAddr, Request<Incoming>> + 'static,
    S::MakeFuture: Send,
    A: Accept<TcpStream, S::Service> + Clone + Send + Sync + 'static,
    A::Stream: AsyncRead + AsyncWrite + Unpin + Send,
    A::Service: SendService<Request<Incoming>> + Send,
    A::Future: Send,
{
    async fn start(&mut self) -> ApiResult<()> {
        log::info!("Opening listen port on {}", self.addr);
        Ok(())
    }

    async fn run(&mut self) -> ApiResult<()> {
        (self.bind)(self)
            .handle(self.handle.clone())
            .serve(self.svc.clone())
            .await?;
        Ok(())
    }

    async fn stop(&mut self) -> ApiResult<()> {
        log::info!("Stopping server {}", self.addr);
        self.handle.graceful_shutdown(Some(Duration::from_secs(1)));
        self.handle = Handle::new();
        Ok(())
    }
}

impl<S> HttpServer<S, DefaultAcceptor> {
    pub fn http(listen_addr: Ipv4Addr, listen_port: u16, svc: S) -> Self {
        let addr = SocketAddr::from((listen_addr, listen_port));

        Self {
            addr,
            bind: |slf| axum_server::bind(slf.addr),
            svc,
            extra: (),
            handle: Handle::new(),
        }
    }
}

impl<S> HttpServer<S, OpenSSLAcceptor, OpenSSLConfig> {
    pub fn https_openssl(
        listen_addr: Ipv4Addr,
        listen_port: u16,
        svc: S,
        certfile: &Utf8Path,
    ) -> ApiResult<Self> {
        fn alpn_select<'a>(_tls: &mut SslRef, client: &'a [u8]) -> Result<&'a [u8], AlpnError> {
            // hue clients only speak http/1.1 to the bridge
            openssl::ssl::select_next_proto(b"\x08http/1.1", client).ok_or(AlpnError::NOACK)
        }

        // mozilla_modern_v5 requires TLSv1.3, which some hue clients lack
        log::debug!("Loading certificate from [{certfile}]");

        let mut tls_builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;
        tls_builder.set_certificate_file(certfile, SslFiletype::PEM)?;
        tls_builder.set_private_key_file(certfile, SslFiletype::PEM)?;
        tls_builder.check_private_key()?;
        tls_builder.set_alpn_select_callback(alpn_select);
        let acceptor = tls_builder.build();

        let config = OpenSSLConfig::from_acceptor(Arc::new(acceptor));

        let addr = SocketAddr::from((listen_addr, listen_port));

        Ok(Self {
            addr,
            bind: |slf: &Self| axum_server::bind_openssl(slf.addr, slf.extra.clone()),
            svc,
            extra: config,
            handle: Handle::new(),
        })
    }
}
