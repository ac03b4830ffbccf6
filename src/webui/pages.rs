//! HTTP routes serving the configuration pages.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form as PostForm, Router,
};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::blocks::{start_save, ConfigRegistry, FormError, RegisteredBlock, WebContext};
use super::forms::{Field, FieldKind, Form};
use super::login::{self, LOGIN_PATH};
use crate::auth::SessionTokens;

pub const SAVED: &str = "These changes were saved";
pub const INVALID: &str = "Please correct errors and try again";

#[derive(Clone)]
pub struct WebState {
    pub registry: Arc<ConfigRegistry>,
    pub ctx: WebContext,
    /// Web login sessions.
    pub sessions: Arc<SessionTokens>,
}

impl WebState {
    pub fn new(registry: ConfigRegistry, ctx: WebContext) -> Self {
        Self {
            registry: Arc::new(registry),
            ctx,
            sessions: Arc::new(SessionTokens::new()),
        }
    }
}

pub fn router(state: WebState) -> Router {
    let pages = Router::new()
        .route("/", get(config_index))
        .route("/config", get(config_index))
        .route("/config/", get(config_index))
        .route("/config/:name", get(config_get).post(config_post))
        .route("/logout", post(login::logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_login,
        ));

    Router::new()
        .route(LOGIN_PATH, get(login::login_page).post(login::login))
        .merge(pages)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn no_such_page(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("no config page named:\"{}\"", name),
    )
        .into_response()
}

/// GET /config/
async fn config_index() -> Redirect {
    Redirect::to("/config/template")
}

/// GET /config/:name
async fn config_get(Path(name): Path<String>, State(state): State<WebState>) -> Response {
    let Some(entry) = state.registry.get(&name) else {
        return no_such_page(&name);
    };
    let initial = match entry.block.initial_data(&state.ctx).await {
        Ok(data) => data,
        Err(e) => return error_response(e),
    };
    let mut form = Form::from_initial(entry.block.fields(), &initial);
    form.full_clean();
    render_page(&state.registry, entry, &form, "", "")
}

/// POST /config/:name
async fn config_post(
    Path(name): Path<String>,
    State(state): State<WebState>,
    PostForm(vars): PostForm<HashMap<String, String>>,
) -> Response {
    let Some(entry) = state.registry.get(&name) else {
        return no_such_page(&name);
    };
    let fields = entry.block.fields();
    let form_data: HashMap<String, String> = fields
        .iter()
        .filter_map(|f| vars.get(&f.name).map(|v| (f.name.clone(), v.clone())))
        .collect();

    let mut form = Form::bound(fields, form_data);
    if !form.is_valid() {
        return render_page(&state.registry, entry, &form, INVALID, "");
    }

    tracing::debug!("save config {}: {:?}", name, form.clean_data().keys().collect::<Vec<_>>());
    match start_save(entry.block.as_ref(), &state.ctx, form.clean_data()).await {
        Ok(()) => render_page(&state.registry, entry, &form, SAVED, ""),
        Err(FormError::Validation(e)) => {
            tracing::debug!("{}", e);
            render_page(&state.registry, entry, &form, "", &e.0)
        }
        Err(e) => error_response(e),
    }
}

fn error_response(e: FormError) -> Response {
    match e {
        FormError::Validation(e) => (StatusCode::BAD_REQUEST, e.0).into_response(),
        FormError::Deluge(e) => {
            tracing::error!("Config page failed: {}", e);
            e.into_response()
        }
    }
}

// ── Rendering ────────────────────────────────────────

pub(super) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render_input(field: &Field, form: &Form) -> String {
    let name = escape(&field.name);
    let value = escape(form.value(&field.name).unwrap_or_default());
    match &field.kind {
        FieldKind::Boolean => {
            let checked = if form.value(&field.name).is_some_and(|v| !v.is_empty()) {
                " checked"
            } else {
                ""
            };
            format!(r#"<input type="checkbox" id="{0}" name="{0}"{1}>"#, name, checked)
        }
        FieldKind::Password { .. } => {
            format!(r#"<input type="password" id="{0}" name="{0}" value="">"#, name)
        }
        FieldKind::Integer { .. } => {
            format!(r#"<input type="number" id="{0}" name="{0}" value="{1}">"#, name, value)
        }
        FieldKind::Float { .. } => format!(
            r#"<input type="number" step="any" id="{0}" name="{0}" value="{1}">"#,
            name, value
        ),
        FieldKind::Choice { choices } => {
            let mut html = format!(r#"<select id="{0}" name="{0}">"#, name);
            for (choice, label) in choices {
                let choice = escape(&super::forms::value_to_input(choice));
                let selected = if choice == value { " selected" } else { "" };
                let _ = write!(
                    html,
                    r#"<option value="{}"{}>{}</option>"#,
                    choice,
                    selected,
                    escape(label)
                );
            }
            html.push_str("</select>");
            html
        }
        FieldKind::Text { .. } | FieldKind::IpAddress | FieldKind::IntRange { .. } => {
            format!(r#"<input type="text" id="{0}" name="{0}" value="{1}">"#, name, value)
        }
    }
}

fn render_page(
    registry: &ConfigRegistry,
    current: &RegisteredBlock,
    form: &Form,
    message: &str,
    error: &str,
) -> Response {
    let title = escape(current.block.title());
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Deluge: {}</title></head><body>\n",
        title
    );

    html.push_str("<div id=\"config-nav\">\n");
    for group in registry.groups() {
        let _ = writeln!(html, "<h3>{}</h3><ul>", escape(group));
        for entry in registry.blocks_in(group) {
            let class = if entry.name == current.name { " class=\"selected\"" } else { "" };
            let _ = writeln!(
                html,
                "<li{}><a href=\"/config/{}\">{}</a></li>",
                class,
                escape(&entry.name),
                escape(entry.block.title())
            );
        }
        html.push_str("</ul>\n");
    }
    html.push_str("<form method=\"post\" action=\"/logout\"><input type=\"submit\" value=\"Logout\"></form>\n");
    html.push_str("</div>\n");

    let _ = writeln!(html, "<div id=\"config-page\"><h2>{}</h2>", title);
    if !current.block.info().is_empty() {
        let _ = writeln!(html, "<p class=\"info\">{}</p>", escape(current.block.info()));
    }
    if !message.is_empty() {
        let _ = writeln!(html, "<div class=\"message\">{}</div>", escape(message));
    }
    if !error.is_empty() {
        let _ = writeln!(html, "<div class=\"error\">{}</div>", escape(error));
    }

    let _ = writeln!(
        html,
        "<form method=\"post\" action=\"/config/{}\"><table>",
        escape(&current.name)
    );
    for field in form.fields() {
        let _ = write!(
            html,
            "<tr><th><label for=\"{}\">{}</label></th><td>{}",
            escape(&field.name),
            escape(&field.label),
            render_input(field, form)
        );
        if let Some(err) = form.error(&field.name) {
            let _ = write!(html, "<span class=\"field-error\">{}</span>", escape(err));
        }
        if let Some(help) = &field.help {
            let _ = write!(html, "<span class=\"help\">{}</span>", escape(help));
        }
        html.push_str("</td></tr>\n");
    }
    html.push_str("</table><input type=\"submit\" value=\"Save\"></form></div>\n</body></html>\n");

    Html(html).into_response()
}
