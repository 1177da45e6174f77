//! Pony Tracker Demo
//!
//! Demonstrates bridle with a small pony roster: an observable model with
//! field validation, change events, and persistence through the local
//! key-value store.

use bridle_core::{Application, Meta, ModelEvent, Options, Query, Schema, Value, ValueMap};
use bridle_store::{LocalStore, NativeKv};
use std::rc::Rc;

fn pony_fields(name: &str, color: &str, cutie_mark: &str) -> ValueMap {
    let mut fields = ValueMap::new();
    fields.insert("name".to_string(), Value::from(name));
    fields.insert("color".to_string(), Value::from(color));
    fields.insert("cutie_mark".to_string(), Value::from(cutie_mark));
    fields
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> bridle_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Bridle Pony Tracker Demo ===\n");

    // Wire an application with an in-memory local store
    let app = Application::new(Options::default());
    let store = Rc::new(LocalStore::new(NativeKv::in_memory()?));
    app.set_default_store(store);

    // A pony has a name (its primary key), a color, and a cutie mark.
    // Names must be non-empty.
    let pony = app.create_model(
        Schema::new()
            .field_with("name", |value| {
                value.as_str().is_some_and(|s| !s.is_empty())
            })
            .field("color")
            .field("cutie_mark"),
        Meta::new("Pony").primary_key("name"),
    )?;

    println!("Defined the Pony model\n");

    // Watch every color change on Rainbow Dash
    let dash = pony.instantiate(pony_fields("Rainbow Dash", "blue", "rainbow bolt"), false)?;
    dash.on(
        "change.color",
        Rc::new(|event: &ModelEvent| {
            if let ModelEvent::Change { value, .. } = event {
                println!("  [event] Rainbow Dash's color is now {value}");
            }
        }),
    );

    // Catch-all listener on Twilight to show every event by name
    let twilight = pony.instantiate(pony_fields("Twilight Sparkle", "purple", "star"), false)?;
    twilight.all(Rc::new(|name: &str, _event: &ModelEvent| {
        println!("  [event] Twilight Sparkle fired '{name}'");
    }));

    println!("Created {} ponies:", pony.cache().len());
    for inst in pony.cache().all() {
        println!(
            "  {} ({}, {})",
            inst.get("name")?,
            inst.get("color")?,
            inst.get("cutie_mark")?,
        );
    }

    // Save everything dirty in one pass
    println!("\nSaving the roster...");
    let query = Query::new();
    dash.save(&query).await?;
    twilight.save(&query).await?;
    println!(
        "  Rainbow Dash stored: {}, dirty: {}",
        dash.is_stored(),
        dash.is_dirty(),
    );

    // Mutating a stored instance marks it dirty until the next save
    println!("\nRepainting Rainbow Dash...");
    dash.set("color", "light blue")?;
    println!("  dirty after set: {}", dash.is_dirty());
    dash.save(&query).await?;
    println!("  dirty after save: {}", dash.is_dirty());

    // Validation fires invalid events instead of rejecting the write
    println!("\nTrying to erase Twilight's name...");
    twilight.on(
        "invalid.name",
        Rc::new(|_event: &ModelEvent| {
            println!("  [event] a pony needs a name!");
        }),
    );
    twilight.set("name", "")?;

    // Remove a pony and confirm the roster shrinks
    println!("\nRetiring Rainbow Dash...");
    dash.one(
        "delete",
        Rc::new(|_event: &ModelEvent| {
            println!("  [event] Rainbow Dash has left the roster");
        }),
    );
    dash.remove(&query).await?;
    println!("  remaining cached ponies: {}", pony.cache().len());

    println!("\n=== Demo Complete ===");
    Ok(())
}
