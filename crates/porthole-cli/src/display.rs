//! Connection info display

use porthole_relay::ConnectionInfo;

/// Fields worth showing, in display order: username, password, name, then
/// any vendor extras. Host and port internals are omitted - the caller
/// connects through the local tunnel, not to them.
pub fn display_fields(info: &ConnectionInfo) -> Vec<(String, String)> {
    let mut user_key: Option<&str> = None;
    let mut password_key: Option<&str> = None;
    let mut name_key: Option<&str> = None;
    let mut extras: Vec<&str> = Vec::new();

    for key in info.fields().keys() {
        match key.as_str() {
            "host" | "hostname" | "port" | "node_id" => {}
            "user" | "username" => {
                // prefer "username" over "user"
                if user_key != Some("username") {
                    user_key = Some(key);
                }
            }
            "password" => password_key = Some(key),
            "name" => name_key = Some(key),
            _ => extras.push(key),
        }
    }

    [user_key, password_key, name_key]
        .into_iter()
        .flatten()
        .chain(extras)
        .filter_map(|key| info.get_string(key).map(|value| (key.to_string(), value)))
        .collect()
}

pub fn print_connection_info(info: &ConnectionInfo) {
    let fields = display_fields(info);
    if fields.is_empty() {
        return;
    }

    println!("Service connection info:");
    let width = fields.iter().map(|(key, _)| key.len()).max().unwrap_or(0) + 1;
    for (key, value) in &fields {
        println!("  {:<width$}: {}", key, value, width = width);
    }
    println!();
}
