//! Payment reminders as messaging deep-links. Only the payload is built
//! here; opening the link is left to the caller.

use crate::config::Config;
use crate::models::Client;
use crate::utils::{digits_only, format_amount};
use crate::views::pending_clients;

const DEEP_LINK_BASE: &str = "https://wa.me/";

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderLink {
    pub client_id: String,
    pub client_name: String,
    /// Country prefix followed by the phone digits
    pub phone: String,
    pub message: String,
    pub url: String,
}

/// Reminder text for a client owing `amount`
pub fn reminder_message(name: &str, amount: f64, config: &Config) -> String {
    let mut message = format!(
        "Estimado/a {},\n\n\
         Espero que se encuentre bien. Le escribo para recordarle amablemente que tiene un pago pendiente de {}.\n\n\
         Agradecemos su pronta atención a este asunto.\n\n",
        name,
        format_amount(&config.currency_symbol, amount)
    );

    if !config.contact_name.is_empty() || !config.contact_phone.is_empty() {
        message.push_str("Para cualquier consulta o reporte de problemas, puede contactar a:\n");
        if !config.contact_name.is_empty() {
            message.push_str(&config.contact_name);
            message.push('\n');
        }
        if !config.contact_phone.is_empty() {
            message.push_str(&format!("Teléfono: {}\n", config.contact_phone));
        }
        message.push('\n');
    }

    message.push_str("¡Muchas gracias!");
    message
}

/// Deep-link to message the client's first phone. `None` if it has no digits.
pub fn reminder_link(client: &Client, config: &Config) -> Option<ReminderLink> {
    let digits = digits_only(&client.phone1);
    if digits.is_empty() {
        return None;
    }

    let phone = format!("{}{}", digits_only(&config.country_code), digits);
    let message = reminder_message(&client.name, client.monthly_amount, config);
    let url = format!("{}{}?text={}", DEEP_LINK_BASE, phone, encode_uri_component(&message));

    Some(ReminderLink {
        client_id: client.id.clone(),
        client_name: client.name.clone(),
        phone,
        message,
        url,
    })
}

/// One reminder per client still owing this cycle
pub fn pending_reminders(clients: &[Client], config: &Config) -> Vec<ReminderLink> {
    pending_clients(clients)
        .into_iter()
        .filter_map(|client| reminder_link(client, config))
        .collect()
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`
fn encode_uri_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientStatus;
    use chrono::Utc;

    fn client(name: &str, phone1: &str, status: ClientStatus) -> Client {
        Client {
            id: format!("id-{}", name),
            name: name.to_string(),
            phone1: phone1.to_string(),
            phone2: None,
            monthly_amount: 150.0,
            status,
            created_at: Utc::now(),
            last_payment_date: None,
            image: None,
        }
    }

    #[test]
    fn encodes_like_uri_components() {
        assert_eq!(encode_uri_component("a b,c"), "a%20b%2Cc");
        assert_eq!(encode_uri_component("¡Hola!"), "%C2%A1Hola!");
        assert_eq!(encode_uri_component("Q150.00\n"), "Q150.00%0A");
    }

    #[test]
    fn message_names_client_and_amount() {
        let config = Config::default();
        let message = reminder_message("Ana", 150.0, &config);
        assert!(message.starts_with("Estimado/a Ana,"));
        assert!(message.contains("pago pendiente de Q150.00."));
        assert!(message.contains("Teléfono: 37080233"));
        assert!(message.ends_with("¡Muchas gracias!"));
    }

    #[test]
    fn contact_block_is_optional() {
        let config = Config {
            contact_name: String::new(),
            contact_phone: String::new(),
            ..Config::default()
        };
        let message = reminder_message("Ana", 10.0, &config);
        assert!(!message.contains("contactar"));
    }

    #[test]
    fn link_uses_country_prefix_and_digits() {
        let config = Config::default();
        let link = reminder_link(&client("Ana", "5551-2345", ClientStatus::Pendiente), &config).unwrap();

        assert_eq!(link.phone, "50255512345");
        assert!(link.url.starts_with("https://wa.me/50255512345?text=Estimado%2Fa%20Ana%2C"));
        assert!(!link.url.contains(' '));
    }

    #[test]
    fn phone_without_digits_has_no_link() {
        let config = Config::default();
        assert!(reminder_link(&client("Ana", "n/a", ClientStatus::Pendiente), &config).is_none());
    }

    #[test]
    fn reminders_only_for_pending_clients() {
        let config = Config::default();
        let clients = vec![
            client("Ana", "5551234", ClientStatus::Pagado),
            client("Beto", "5559876", ClientStatus::Pendiente),
        ];
        let reminders = pending_reminders(&clients, &config);
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].client_name, "Beto");
    }
}
