// SQLite schema for the chat store. Timestamps are RFC 3339 text.

diesel::table! {
    roles (name) {
        name -> Text,
        desk_access -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    identities (id) {
        id -> Text,
        email -> Text,
        username -> Text,
        first_name -> Text,
        last_name -> Text,
        full_name -> Text,
        enabled -> Bool,
        user_type -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    identity_roles (id) {
        id -> Integer,
        identity_id -> Text,
        role -> Text,
    }
}

diesel::table! {
    chat_identities (id) {
        id -> Text,
        identity_id -> Text,
        full_name -> Text,
        first_name -> Text,
        enabled -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    workspaces (id) {
        id -> Text,
        workspace_name -> Text,
        visibility -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    workspace_members (id) {
        id -> Integer,
        workspace_id -> Text,
        user_id -> Text,
        is_admin -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    channels (id) {
        id -> Text,
        channel_name -> Text,
        workspace_id -> Text,
        channel_type -> Text,
        channel_description -> Text,
        is_archived -> Bool,
        is_thread -> Bool,
        pinned_messages_string -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    channel_members (id) {
        id -> Integer,
        channel_id -> Text,
        user_id -> Text,
        is_admin -> Bool,
        allow_notifications -> Bool,
        last_visit -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    messages (id) {
        id -> Text,
        channel_id -> Text,
        owner -> Text,
        message_type -> Text,
        text -> Text,
        json -> Text,
        is_reply -> Bool,
        linked_message -> Nullable<Text>,
        created_at -> Text,
        modified_at -> Text,
    }
}

diesel::table! {
    message_reactions (id) {
        id -> Text,
        owner -> Text,
        reaction -> Text,
        reaction_escaped -> Text,
        message_id -> Text,
        channel_id -> Text,
        is_custom -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    pinned_messages (id) {
        id -> Integer,
        channel_id -> Text,
        message_id -> Text,
        owner -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    import_jobs (id) {
        id -> Text,
        source_file -> Text,
        workspace_name -> Text,
        status -> Text,
        summary -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    roles,
    identities,
    identity_roles,
    chat_identities,
    workspaces,
    workspace_members,
    channels,
    channel_members,
    messages,
    message_reactions,
    pinned_messages,
    import_jobs,
);
