diesel::table! {
    documents (id) {
        id -> Integer,
        doc_id -> Text,
        text -> Text,
        metadata -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}
