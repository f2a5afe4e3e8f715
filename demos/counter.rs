//! Simple counter example demonstrating vue_signals.
//!
//! This example shows:
//! - Mounting a view-model on a headless node tree
//! - `{{ }}` interpolation, `v-model` and `v-on:click` bindings
//! - Watching a key directly

use vue_signals::prelude::*;

fn document() -> Element {
    Element::new("body").child(
        Element::new("div")
            .attr("id", "app")
            .child(Element::new("h1").text("{{ title }}"))
            .child(Element::new("input").attr("v-model", "title"))
            .child(Element::new("button").attr("v-on:click", "increment").text("+1"))
            .child(Element::new("button").attr("v-on:click", "reset").text("Reset"))
            .child(Element::new("p").attr("id", "count").text("Count: {{ count }}")),
    )
}

fn main() -> vue_signals::Result<()> {
    let document = document();
    let vm = ViewModel::new(
        Options::new()
            .mount_selector(document.clone(), "#app")
            .data_json(r#"{ "title": "Counter with signals", "count": 0 }"#)?
            .method("increment", |data| {
                let count = data.get("count").and_then(|v| v.as_f64()).unwrap_or(0.0);
                data.set("count", count + 1.0);
            })
            .method("reset", |data| data.set("count", 0)),
    )?;

    let _logger = vm.watch("count", |value| println!("count changed to {value}"));

    let count = document.query_selector("#count").map(|p| p.text_content());
    println!("{}", count.unwrap_or_default());

    for _ in 0..3 {
        vm.call("increment")?;
    }
    if let Some(input) = document.query_selector("input") {
        input.input("Renamed counter");
    }
    vm.call("reset")?;

    println!("{}", vm.state().snapshot()?);
    Ok(())
}
