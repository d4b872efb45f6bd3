use futures::{Future, TryFutureExt};
use hyper::{server::Server, service::make_service_fn};
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::net::SocketAddr;
use warp::filters::BoxedFilter;
use warp::Reply;

/// Creates a `std::net::TcpListener` for the given `addr` with the
/// `SO_REUSEADDR` flag set.
fn make_listener(addr: SocketAddr) -> Result<std::net::TcpListener, anyhow::Error> {
    let is_ipv4 = addr.is_ipv4();
    let domain = if is_ipv4 { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    // Dual-stack behaviour varies by OS; always binding v6 sockets v6-only
    // lets one socket per domain share a port.
    if !is_ipv4 {
        socket.set_only_v6(true)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Create a hyper server with the provided `filter`, binding to `addr`.
/// Incoming connections get `TCP_NODELAY`.
pub(crate) fn serve_it(
    addr: SocketAddr,
    filter: BoxedFilter<(impl Reply + 'static,)>,
) -> anyhow::Result<(SocketAddr, impl Future<Output = anyhow::Result<()>>)> {
    let filtered_service = warp::service(filter);

    let make_svc = make_service_fn(move |_| {
        let filtered_service = filtered_service.clone();
        async move { Ok::<_, Infallible>(filtered_service) }
    });

    let listener = make_listener(addr)?;
    let bound_to = listener.local_addr()?;
    let builder = Server::from_tcp(listener)?;
    let fut = builder.tcp_nodelay(true).serve(make_svc).map_err(|e| e.into());
    Ok((bound_to, fut))
}
