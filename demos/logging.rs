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

use bean_context::{
    ApplicationContext, BeanType, Binding, ComponentCatalog, InjectCell, Param, PropertyResolver,
};
use std::sync::Arc;

const SETTINGS: &str = r#"
[logging]
level = "debug"
format = "pretty"

[database]
url = "postgres://localhost/mydb"
"#;

struct Database {
    url: String,
}

impl Database {
    fn connect(&self) {
        println!("  [App] Connecting to {}", self.url);
    }

    fn disconnect(&self) {
        println!("  [App] Disconnecting from {}", self.url);
    }
}

struct UserService {
    database: InjectCell<Arc<Database>>,
}

fn catalog() -> ComponentCatalog {
    ComponentCatalog::new()
        .with(
            BeanType::builder::<Database>()
                .method("connect", |db: &Database| {
                    db.connect();
                    Ok(())
                })
                .method("disconnect", |db: &Database| {
                    db.disconnect();
                    Ok(())
                })
                .component()
                .type_name("demo::Database")
                .constructor(vec![Param::value::<String>("${database.url}")], |args| {
                    Ok(Database { url: args.take(0)? })
                })
                .post_construct("connect")
                .pre_destroy("disconnect")
                .build(),
        )
        .with(
            BeanType::builder::<UserService>()
                .field(
                    "database",
                    Binding::autowired::<Database>(),
                    |s: &UserService, db: Arc<Database>| Ok(s.database.set(db)?),
                )
                .component()
                .type_name("demo::UserService")
                .constructor(Vec::new(), |_| {
                    Ok(UserService {
                        database: InjectCell::new(),
                    })
                })
                .build(),
        )
}

fn main() {
    let properties = match PropertyResolver::from_toml_str(SETTINGS) {
        Ok(properties) => properties,
        Err(e) => {
            eprintln!("invalid settings: {e}");
            return;
        }
    };

    // Subscriber settings come from the [logging] table. Without logging-json
    // or logging-pretty no subscriber is installed and events are dropped.
    match bean_context::logging::LoggingBuilder::from_properties(&properties) {
        Ok(builder) => {
            builder.init();
        }
        Err(e) => eprintln!("invalid logging settings: {e}"),
    }

    println!("=== bean-context Logging Demo ===\n");

    // Logs every state transition, early singleton and injected member
    let context = match ApplicationContext::builder(catalog())
        .scan("demo")
        .properties(properties)
        .build()
    {
        Ok(context) => context,
        Err(e) => {
            eprintln!("bootstrap failed: {e}");
            return;
        }
    };

    let users: Arc<UserService> = match context.get_bean() {
        Ok(users) => users,
        Err(e) => {
            eprintln!("lookup failed: {e}");
            return;
        }
    };
    if let Some(db) = users.database.get() {
        println!("  [App] UserService wired to {}", db.url);
    }

    // Not found: error only, nothing is created lazily
    if let Err(e) = context.get_bean_by_name("cache") {
        println!("  [App] {e}");
    }

    // Logs the destroy hooks and the state change
    context.close();

    println!("\n=== Demo Complete ===");
}
