table! {
    article_tags (id) {
        id -> Integer,
        article_id -> Integer,
        tag_id -> Integer,
    }
}

table! {
    article_users (id) {
        id -> Integer,
        user_id -> Integer,
    }
}

table! {
    articles (id) {
        id -> Integer,
        author_id -> Integer,
        slug -> Text,
        title -> Text,
        description -> Text,
        body -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        deleted_at -> Nullable<Timestamp>,
    }
}

table! {
    comments (id) {
        id -> Integer,
        article_id -> Integer,
        user_id -> Integer,
        body -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    favorites (id) {
        id -> Integer,
        article_id -> Integer,
        user_id -> Integer,
    }
}

table! {
    followers (id) {
        id -> Integer,
        user_id -> Integer,
        follower_id -> Integer,
    }
}

table! {
    tags (id) {
        id -> Integer,
        tag -> Text,
    }
}

table! {
    users (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        bio -> Nullable<Text>,
        image -> Nullable<Text>,
        password_hash -> Text,
    }
}

joinable!(article_tags -> articles (article_id));
joinable!(article_tags -> tags (tag_id));
joinable!(article_users -> users (user_id));
joinable!(articles -> article_users (author_id));
joinable!(comments -> article_users (user_id));
joinable!(comments -> articles (article_id));
joinable!(favorites -> article_users (user_id));
joinable!(favorites -> articles (article_id));

allow_tables_to_appear_in_same_query!(
    article_tags,
    article_users,
    articles,
    comments,
    favorites,
    followers,
    tags,
    users,
);
