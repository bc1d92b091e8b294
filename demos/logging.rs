//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use lifetime_di::{ContainerBuilder, Disposable, Lazy, Owned};
use std::sync::Arc;

trait Log: Send + Sync {
    fn write(&self, message: &str);
}

struct ConsoleLog;

impl Log for ConsoleLog {
    fn write(&self, message: &str) {
        println!("  [App] {message}");
    }
}

#[allow(dead_code)]
struct Database {
    url: String,
}

impl Disposable for Database {
    fn dispose(&self) {
        println!("  [App] Closing {}", self.url);
    }
}

struct UserService {
    db: Arc<Database>,
    log: Lazy<dyn Log>,
}

struct RequestContext {
    request_id: u32,
}

fn main() {
    // JSON if logging-json is enabled, pretty if logging-pretty is enabled
    lifetime_di::logging::init();

    println!("=== Lifetime DI Logging Demo ===\n");

    // Registrations (logs: "Registering component")
    let mut builder = ContainerBuilder::new();
    builder
        .register(|_| Ok(ConsoleLog))
        .as_service(|l| l as Arc<dyn Log>)
        .single_instance();
    builder
        .register(|_| {
            Ok(Database {
                url: "postgres://localhost/mydb".into(),
            })
        })
        .instance_per_matching_lifetime_scope("request")
        .disposable();
    builder.register(|ctx| {
        Ok(UserService {
            db: ctx.get()?,
            log: ctx.resolve()?,
        })
    });
    builder
        .register(|ctx| {
            Ok(RequestContext {
                request_id: ctx.parameter("request_id")?,
            })
        })
        .instance_per_lifetime_scope();

    // Freeze the registry (logs: "Registry built", "Creating root lifetime scope")
    let container = builder.build();

    // Unregistered services are reported, not panicked on
    assert!(container.try_get::<i32>().unwrap().is_none());

    for request_id in 1..=2_u32 {
        // Tagged scope per request (logs: "Beginning lifetime scope")
        let request = container.begin_tagged_scope("request").unwrap();

        let params = lifetime_di::Parameters::new().named("request_id", request_id);
        let ctx = request.get_with::<RequestContext>(&params).unwrap();

        // Activations (logs: "Activated component"), then cache hits at TRACE
        let users = request.get::<UserService>().unwrap();
        users
            .log
            .value()
            .unwrap()
            .write(&format!("handling request {}", ctx.request_id));
        let _ = Arc::clone(&users.db);

        // A unit of work with its own scope (released when dropped)
        let owned = request.resolve::<Owned<UserService>>().unwrap();
        drop(owned);

        // Disposal (logs: "Disposing lifetime scope")
        request.dispose();
    }

    // Resolving outside a "request" scope fails with NoMatchingScopeFound
    if let Err(e) = container.get::<Database>() {
        println!("  [App] Expected failure: {e}");
    }

    container.dispose();

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
