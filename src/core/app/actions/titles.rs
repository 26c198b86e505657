use crate::core::app::App;
use crate::core::session::SessionId;
use crate::core::transport::TransportError;

pub(super) fn handle_title_completed(
    app: &mut App,
    session_id: SessionId,
    result: Result<String, TransportError>,
) {
    app.titles.complete(&mut app.store, session_id, result);
}
