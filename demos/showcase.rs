use mallo::http::StatusCode;
use mallo::{App, Config, Request, Response, Server};
use serde_json::{Value, json};
use std::iter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TEMPLATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/templates");
const STATIC: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/static");

/// Returns the notes stored in the session of `request`.
///
fn notes(request: &Request) -> Vec<Value> {
    request
        .session()
        .and_then(|session| session.get("notes"))
        .and_then(|notes| notes.as_array().cloned())
        .unwrap_or_default()
}

/// Renders the list of notes with a form to add another.
///
fn index(request: &Request, app: &App) -> mallo::Result<String> {
    let context = json!({
        "notes": notes(request),
        "csrf_token": request.csrf_token(),
        "action": app.url_for("add_note", iter::empty::<(&str, &str)>())?,
        "stylesheet": app.url_for(mallo::STATIC_ROUTE, [("filename", "app.css")])?,
    });

    Ok(app.render_template(format!("{}/index.html", TEMPLATES), &context)?)
}

/// Appends the `text` form field to the notes of the session and redirects
/// back to the index.
///
fn add_note(request: &Request, app: &App) -> mallo::Result<Response> {
    let Some(session) = request.session() else {
        mallo::raise!(500, message = "sessions require a secret key");
    };

    let text = match request.form("text").map(str::trim) {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => mallo::raise!(400, message = "a note needs some text"),
    };

    session.update(|values| {
        let notes = values.entry("notes").or_insert_with(|| json!([]));

        if let Some(notes) = notes.as_array_mut() {
            notes.push(Value::String(text));
        }
    });

    Response::redirect(&app.url_for("index", iter::empty::<(&str, &str)>())?)
}

/// Responds with a single note as JSON.
///
fn show_note(request: &Request, _: &App) -> mallo::Result<Value> {
    let index = request.param("index").and_then(|index| index.as_int());

    let note = index
        .and_then(|index| usize::try_from(index).ok())
        .and_then(|index| notes(request).get(index).cloned());

    match note {
        Some(note) => Ok(json!({ "index": index, "note": note })),
        None => mallo::raise!(404, message = "no such note"),
    }
}

/// Downloads every note as a text file.
///
fn export(request: &Request, _: &App) -> mallo::Result<Response> {
    let lines: Vec<String> = notes(request)
        .iter()
        .filter_map(|note| note.as_str().map(|note| format!("- {}\n", note)))
        .collect();

    Response::attachment("notes.txt", lines.concat())
}

#[tokio::main]
async fn main() -> Result<(), mallo::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mallo=debug,showcase=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env()
        .static_folder(STATIC)
        .error_page(404, format!("{}/404.html", TEMPLATES));

    if config.secret().is_none() {
        tracing::warn!("MALLO_SECRET_KEY is not set. Using an insecure development key.");
        config = config.secret_key("insecure development key");
    }

    let mut app = App::new(config);

    app.route("/").named("index").get(index)?;
    app.route("/notes").named("add_note").post(add_note)?;
    app.route("/notes/<int:index>").get(show_note)?;
    app.route("/notes.txt").get(export)?;

    app.error_handler(StatusCode::FORBIDDEN, |_, _| {
        Ok("<h1>Forbidden</h1><p>Reload the page and try again.</p>")
    });

    Server::new(app).listen(("127.0.0.1", 8080)).await
}
