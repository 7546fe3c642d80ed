//! Basic example demonstrating EmberDB Rust SDK usage.

use emberdb::geometry::point;
use emberdb::{field, ChangeEvent, ClientOptions, EmberDb, ListenOptions, QueryBuilder, SortDir, UpdateSpec};
use serde_json::json;

#[tokio::main]
async fn main() -> emberdb::Result<()> {
  let options = ClientOptions::new("http://localhost:8080", "main").with_project_name("demo");
  let db = EmberDb::new(options)?;

  let users = db.collection("users")?;

  // Insert a document under a generated id
  let alice = users.new_document();
  db.set_document(
    &alice,
    &json!({
      "name": "Alice",
      "email": "alice@example.com",
      "age": 31,
      "home": point(10.75, 59.91)
    }),
  )
  .await?;
  println!("Inserted: {}", alice);

  // Read it back
  if let Some(doc) = db.get_document(&alice).await? {
    println!("Fetched: {:?}", doc.data());
  }

  // Update
  let update = UpdateSpec::new()
    .increment("age", 1)
    .set("email", "alice@newdomain.com")
    .unset("nickname");
  db.update_document(&alice, &update).await?;

  // Query
  let query = QueryBuilder::new()
    .find(field("age").gte(18))
    .sort("name", SortDir::Asc)
    .limit(10);
  let adults = db.query(&users, &query).await?;
  for doc in adults.iter() {
    println!("  {} -> {:?}", doc.id(), doc.get("name"));
  }

  // Listen for changes
  println!("Listening for changes (Ctrl+C to stop)...");
  let mut sub = db.listen_collection(&users, ListenOptions::new().with_initial_data(true))?;
  while let Some(event) = sub.next().await {
    match event {
      Ok(ChangeEvent::InitialCollection(collection)) => {
        println!("Initial: {} documents", collection.len())
      }
      Ok(ChangeEvent::Update {
        document,
        changed_fields,
        ..
      }) => println!("Updated {}: {:?}", document.id(), changed_fields),
      Ok(ChangeEvent::Delete { document_id }) => println!("Deleted {}", document_id),
      Ok(other) => println!("Change: {:?}", other),
      Err(e) => eprintln!("Listener error: {}", e),
    }
  }
  println!("Closed: {:?}", sub.closed().await);

  Ok(())
}
