//! HTTP handlers: index page, raw content and the live-sync WebSocket

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use futures_util::StreamExt;
use std::path::Path;
use tracing::{debug, error, warn};

use crate::session::Session;
use crate::AppState;

/// Serve the preview page titled with the file's base name
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&state.file_path))
}

/// Serve the file content as plain text
pub async fn content(State(state): State<AppState>) -> Response {
    match tokio::fs::read(&*state.file_path).await {
        Ok(bytes) => {
            debug!("Serving raw content of {}", state.file_path.display());
            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to read {}: {}", state.file_path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

/// Upgrade same-origin requests and hand the socket to a new session
pub async fn websocket(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !is_same_origin(&headers) {
        warn!(
            origin = ?headers.get(header::ORIGIN),
            "Rejected cross-origin websocket request"
        );
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    ws.max_message_size(state.session.max_message_bytes)
        .on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: AppState, socket: WebSocket) {
    let session = Session::new(
        &*state.file_path,
        state.renderer.clone(),
        state.session.clone(),
        &state.shutdown,
    );
    let (sink, stream) = socket.split();
    session.run(sink, stream).await;
}

/// An absent Origin, or one equal to `http://` + Host, is accepted
pub fn is_same_origin(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };

    origin
        .to_str()
        .map(|origin| origin.strip_prefix("http://") == Some(host))
        .unwrap_or(false)
}

fn render_index(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; }}
        header {{ display: flex; gap: 1rem; align-items: center; padding: 0.5rem 1rem; border-bottom: 1px solid #ddd; }}
        main {{ display: flex; height: calc(100vh - 3rem); }}
        #editor {{ flex: 1; font-family: monospace; padding: 1rem; border: none; border-right: 1px solid #ddd; resize: none; }}
        #preview {{ flex: 1; padding: 1rem 2rem; overflow: auto; }}
        #status.error {{ color: #c00; }}
        pre {{ background: #f5f5f5; padding: 1rem; border-radius: 4px; }}
        code {{ background: #f5f5f5; padding: 0.2rem 0.4rem; border-radius: 2px; }}
    </style>
</head>
<body>
    <header>
        <strong>{title}</strong>
        <button id="save">Save</button>
        <span id="status">Connecting...</span>
    </header>
    <main>
        <textarea id="editor" spellcheck="false"></textarea>
        <article id="preview"></article>
    </main>
    <script>
        const editor = document.getElementById("editor");
        const preview = document.getElementById("preview");
        const status = document.getElementById("status");

        function setStatus(text, isError) {{
            status.textContent = text;
            status.className = isError ? "error" : "";
        }}

        const socket = new WebSocket("ws://" + location.host + "/ws");
        socket.onopen = () => setStatus("Connected", false);
        socket.onclose = () => setStatus("Disconnected", true);
        socket.onmessage = (event) => {{
            if (event.data.startsWith("{{")) {{
                try {{
                    const message = JSON.parse(event.data);
                    if (message.type === "content") {{
                        editor.value = message.content;
                    }} else if (message.type === "error") {{
                        setStatus(message.error, true);
                    }}
                    return;
                }} catch (_) {{}}
            }}
            preview.innerHTML = event.data;
        }};

        function save() {{
            socket.send(JSON.stringify({{ type: "save", content: editor.value }}));
            setStatus("Saved", false);
        }}

        document.getElementById("save").addEventListener("click", save);
        document.addEventListener("keydown", (event) => {{
            if ((event.ctrlKey || event.metaKey) && event.key === "s") {{
                event.preventDefault();
                save();
            }}
        }});
    </script>
</body>
</html>"#,
        title = html_escape::encode_text(&name)
    )
}
