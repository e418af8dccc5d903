use crate::models::{Message, Role, Session};

pub fn export_to_markdown(session: &Session, messages: &[Message]) -> String {
    let mut output = format!("# {}\n\n", session.title);
    output.push_str(&format!(
        "> Messages: {} | Started: {}\n\n",
        session.message_count,
        session.created_at.format("%Y-%m-%d %H:%M")
    ));

    output.push_str("---\n\n");

    for msg in messages {
        let role_label = match msg.role {
            Role::User => "You",
            Role::Assistant => "Tutor",
        };
        output.push_str(&format!("### {}\n\n{}\n\n", role_label, msg.content));
        if let Some(translation) = &msg.metadata.translation {
            output.push_str(&format!("> {}\n\n", translation));
        }
    }

    output
}
