//! Walk-through of the result bus: a main screen asks for a cat and a
//! gallery picture, and the "launched" screens answer through the bus.

use std::sync::{Arc, Mutex};

use arbus_events::{ActivityResult, BusConfig, CallbackResult, Event, EventBus, RESULT_OK, ResultRouter};
use tracing::info;

#[derive(Debug, Clone)]
struct Cat {
    name: String,
}

#[derive(Debug)]
struct CatChosen {
    cat: Cat,
}
impl Event for CatChosen {}

#[derive(Debug)]
struct PermissionsGranted;
impl Event for PermissionsGranted {}

#[derive(Debug)]
struct ImageChosen {
    path: String,
}
impl Event for ImageChosen {}

/// What the main screen currently shows.
#[derive(Debug, Default)]
struct MainScreen {
    cat_label: String,
    image: Option<String>,
}

fn main() -> anyhow::Result<()> {
    arbus_observability::init();

    let bus = EventBus::with_config(BusConfig::from_env()?);
    let screen = Arc::new(Mutex::new(MainScreen::default()));
    let main_scope = bus.scope();

    // "Choose cat": launch the list and wait for its answer.
    {
        let screen = Arc::clone(&screen);
        main_scope.on(move |event: &CatChosen| -> CallbackResult {
            info!(cat = %event.cat.name, "cat chosen");
            lock(&screen).cat_label = event.cat.name.clone();
            Ok(())
        });
    }

    // The cat list asks for a permission first and answers once it is granted.
    let list_scope = bus.scope();
    {
        let answer = bus.clone();
        let cat = Cat { name: "Garfield".into() };
        list_scope.on(move |_: &PermissionsGranted| -> CallbackResult {
            answer.dispatch(&CatChosen { cat: cat.clone() })?;
            Ok(())
        });
    }
    bus.dispatch(&PermissionsGranted)?;
    let released = list_scope.close();
    info!(released, "cat list closed");

    // "Choose picture": an external gallery answers with a raw result.
    let gallery = ResultRouter::new()
        .add_result_mapper(RESULT_OK, |data: Option<String>| data.map(|path| ImageChosen { path }));
    {
        let screen = Arc::clone(&screen);
        main_scope.on(move |event: &ImageChosen| -> CallbackResult {
            info!(path = %event.path, "image chosen");
            lock(&screen).image = Some(event.path.clone());
            Ok(())
        });
    }
    gallery.after_result(|| -> CallbackResult {
        info!("gallery result handled");
        Ok(())
    });
    gallery.route(ActivityResult::ok("content://media/cats/42".to_string()), &bus)?;
    gallery.route(ActivityResult::canceled(), &bus)?;

    let shown = lock(&screen);
    info!(cat = %shown.cat_label, image = ?shown.image, "main screen updated");
    drop(shown);

    let released = main_scope.close();
    info!(released, remaining = bus.len(), "main screen destroyed");
    Ok(())
}

fn lock(screen: &Mutex<MainScreen>) -> std::sync::MutexGuard<'_, MainScreen> {
    screen.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
