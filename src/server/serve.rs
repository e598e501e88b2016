use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time;

use crate::app::App;
use crate::error::Error;
use crate::response::Response;

/// The request type used by our `hyper` service.
type HttpRequest = http::Request<Incoming>;

/// The response type returned to `hyper`.
type HttpResponse = http::Response<Full<Bytes>>;

pub async fn serve<F>(
    app: Arc<App>,
    listener: TcpListener,
    max_connections: usize,
    shutdown_timeout: Duration,
    signal: F,
) -> Result<(), Error>
where
    F: Future<Output = ()> + Send,
{
    // Each connection holds a permit until it closes. When every permit is
    // taken, accepting waits for a connection to close.
    let semaphore = Arc::new(Semaphore::new(max_connections));

    // Inflight connections. Drained before the server exits.
    let mut connections = JoinSet::new();

    // Notifies inflight connections to begin a graceful shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::pin!(signal);

    loop {
        let permit = tokio::select! {
            _ = &mut signal => break,
            acquired = Arc::clone(&semaphore).acquire_owned() => acquired?,
        };

        let stream = tokio::select! {
            _ = &mut signal => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(error) => {
                    tracing::error!(%error, "failed to accept a connection");
                    continue;
                }
            },
        };

        let service = {
            let app = Arc::clone(&app);
            service_fn(move |request| serve_request(Arc::clone(&app), request))
        };

        let mut shutdown_rx = shutdown_rx.clone();

        connections.spawn(async move {
            let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);

            tokio::pin!(connection);

            let result = tokio::select! {
                served = &mut connection => served,
                _ = shutdown_rx.changed() => {
                    connection.as_mut().graceful_shutdown();
                    connection.await
                }
            };

            drop(permit);
            result
        });

        while let Some(joined) = connections.try_join_next() {
            handle_joined(joined);
        }
    }

    if shutdown_tx.send(true).is_err() {
        tracing::debug!("no inflight connections to notify");
    }

    let drain = async {
        while let Some(joined) = connections.join_next().await {
            handle_joined(joined);
        }
    };

    if time::timeout(shutdown_timeout, drain).await.is_err() {
        tracing::warn!("inflight connections did not close before the shutdown timeout");
    }

    Ok(())
}

/// Reads the body of `request` and dispatches it on the blocking thread pool.
///
async fn serve_request(app: Arc<App>, request: HttpRequest) -> Result<HttpResponse, Infallible> {
    let limit = app.config().request_size_limit();
    let (parts, body) = request.into_parts();

    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(error) => {
            let error = if error.downcast_ref::<LengthLimitError>().is_some() {
                Error::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large.")
            } else {
                tracing::debug!(%error, "failed to read the request body");
                Error::new(StatusCode::BAD_REQUEST, "Unable to read the request body.")
            };

            return Ok(error_response(error).map(Full::new));
        }
    };

    let request = http::Request::from_parts(parts, body);
    let response = match task::spawn_blocking(move || app.dispatch(request)).await {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(%error, "dispatch task failed");
            error_response(Error::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"))
        }
    };

    Ok(response.map(Full::new))
}

fn error_response(error: Error) -> http::Response<Bytes> {
    Response::from(error).into_http().unwrap_or_else(|_| {
        let mut response = http::Response::new(Bytes::new());

        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

fn handle_joined(joined: Result<Result<(), hyper::Error>, JoinError>) {
    match joined {
        Ok(Err(error)) if error.is_canceled() || error.is_incomplete_message() => {
            tracing::debug!(%error, "client disconnected");
        }
        Ok(Err(error)) => {
            tracing::error!(%error, "connection error");
        }
        Err(error) if error.is_panic() => {
            tracing::error!(%error, "connection task panicked");
        }
        Ok(Ok(())) | Err(_) => {}
    }
}
