use std::any::Any;
use std::panic;
use std::sync::Arc;

use tokio::runtime::Handle;

use flagwatch_engine::ErrorSink;

/// Forward panics to `sink` after the default hook has printed them.
///
/// A panic has no guild attached, so it is reported under the unknown tenant.
pub fn install(sink: Arc<dyn ErrorSink>, runtime: Handle) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        previous(info);

        let message = panic_message(info.payload());
        let detail = info
            .location()
            .map(|location| format!("panicked at {location}"))
            .unwrap_or_else(|| "panicked at an unknown location".to_owned());

        let sink = Arc::clone(&sink);
        runtime.spawn(async move {
            sink.report(None, &message, &detail).await;
        });
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }

    payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| "panic with a non-string payload".to_owned())
}
