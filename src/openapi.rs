use crate::models::{Forum, NewForum, NewPost, NewThread, NewUser, Post, Status, Thread, User, UserDetails};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::status,
        crate::routes::forum_create,
        crate::routes::thread_create,
        crate::routes::thread_list_posts,
        crate::routes::post_create,
        crate::routes::post_details,
        crate::routes::user_create,
        crate::routes::user_details,
    ),
    components(schemas(
        Forum, NewForum, Thread, NewThread, Post, NewPost,
        User, NewUser, UserDetails, Status
    )),
    tags(
        (name = "forums", description = "Forum operations"),
        (name = "threads", description = "Thread operations"),
        (name = "posts", description = "Post operations and reply trees"),
        (name = "users", description = "User operations"),
    )
)]
pub struct ApiDoc;
