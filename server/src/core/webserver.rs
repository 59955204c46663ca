//! Webserver implementation: bind, serve, tear down background machinery.
//!
//! TLS termination is out of scope; this binds plain HTTP and expects
//! whatever fronts it to own certificates.

use crate::prelude::*;
use crate::routes;

pub async fn run(app: App) -> ApiResult<()> {
	let router = routes::init_routes(app.clone());

	let listener = tokio::net::TcpListener::bind(app.opts.listen.as_ref()).await?;
	info!("listening on {}", app.opts.listen);

	let result = axum::serve(listener, router).await;

	app.scheduler.shutdown();
	app.dispatcher.shutdown();

	result.map_err(Error::from)
}

// vim: ts=4
